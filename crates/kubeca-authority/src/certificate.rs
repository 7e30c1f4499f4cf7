//! Issued certificate inspection

use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

use crate::error::{AuthorityError, Result};

/// What was issued, for logs and callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    /// Subject distinguished name in RFC 4514 form
    pub subject: String,
    /// Serial number as colon-separated hex
    pub serial: String,
    /// Start of validity (Unix timestamp)
    pub not_before: i64,
    /// End of validity (Unix timestamp)
    pub not_after: i64,
    /// DNS subject alternative names
    pub dns_names: Vec<String>,
}

impl CertificateSummary {
    /// Parse the first certificate of a PEM document
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| AuthorityError::Parse(format!("failed to parse certificate: {}", e)))?;

        let dns_names = cert
            .subject_alternative_name()
            .map_err(|e| AuthorityError::Parse(format!("invalid SAN extension: {}", e)))?
            .map(|san| {
                san.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some(dns.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            subject: cert.subject().to_string(),
            serial: cert.raw_serial_as_string(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            dns_names,
        })
    }

    /// Validity span in seconds
    pub fn lifetime_secs(&self) -> i64 {
        self.not_after - self.not_before
    }
}

/// Parse PEM-encoded data and return the DER bytes of the first block
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| AuthorityError::Parse(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}
