//! Issuers: the signing side of the authority boundary
//!
//! An issuer owns a set of profiles and signs PEM certificate requests under
//! one of them. The controller only sees the [`Issuer`] trait; provider
//! variants (file-backed keys, HSM, cloud KMS) live behind it.
//!
//! # Security Model
//!
//! - The issuer holds the CA key; requesters submit only a CSR
//! - Subject and SANs come from the CSR, everything else from the profile
//! - Every certificate gets a fresh random serial

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rcgen::{
    CertificateSigningRequestParams, ExtendedKeyUsagePurpose, IsCa, Issuer as CaIssuer, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use tracing::debug;

use crate::certificate::{parse_pem, CertificateSummary};
use crate::config::{IssuerConfig, ProfileConfig, Usage};
use crate::error::{AuthorityError, Result};

/// Backdate applied to notBefore to tolerate clock skew between nodes
pub const CLOCK_SKEW_ALLOWANCE: Duration = Duration::from_secs(5 * 60);

/// A sign request: the PEM CSR and the profile to sign it under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    /// PEM-encoded certificate signing request
    pub request: Vec<u8>,
    /// Profile name
    pub profile: String,
}

/// A signed certificate
#[derive(Debug, Clone)]
pub struct SignResult {
    /// Parsed view of the issued certificate
    pub certificate: CertificateSummary,
    /// PEM-encoded leaf certificate
    pub pem: String,
}

/// A configured signing authority
#[async_trait]
pub trait Issuer: Send + Sync {
    /// Stable label, matched against the first half of a signer name
    fn label(&self) -> &str;

    /// Intermediates appended to every issued leaf; empty when none
    fn chain_pem(&self) -> &str;

    /// Sign `request` under the named profile
    async fn sign(&self, request: &SignRequest) -> Result<SignResult>;
}

/// Runtime form of a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Profile name
    pub name: String,
    /// Lifetime of issued certificates
    pub expiry: Duration,
    /// Usages stamped on issued certificates
    pub usages: Vec<Usage>,
}

impl Profile {
    /// Build from a named config entry
    pub fn from_config(name: &str, config: &ProfileConfig) -> Result<Self> {
        let expiry_secs = config.expiry_hours.checked_mul(3600).ok_or_else(|| {
            AuthorityError::InvalidConfig(format!(
                "profile {} expiry_hours {} is out of range",
                name, config.expiry_hours
            ))
        })?;
        Ok(Self {
            name: name.to_string(),
            expiry: Duration::from_secs(expiry_secs),
            usages: config.usages.clone(),
        })
    }

    fn key_usages(&self) -> Vec<KeyUsagePurpose> {
        self.usages
            .iter()
            .filter_map(|u| match u {
                Usage::DigitalSignature => Some(KeyUsagePurpose::DigitalSignature),
                Usage::ContentCommitment => Some(KeyUsagePurpose::ContentCommitment),
                Usage::KeyEncipherment => Some(KeyUsagePurpose::KeyEncipherment),
                Usage::DataEncipherment => Some(KeyUsagePurpose::DataEncipherment),
                Usage::KeyAgreement => Some(KeyUsagePurpose::KeyAgreement),
                _ => None,
            })
            .collect()
    }

    fn extended_key_usages(&self) -> Vec<ExtendedKeyUsagePurpose> {
        self.usages
            .iter()
            .filter_map(|u| match u {
                Usage::ServerAuth => Some(ExtendedKeyUsagePurpose::ServerAuth),
                Usage::ClientAuth => Some(ExtendedKeyUsagePurpose::ClientAuth),
                Usage::CodeSigning => Some(ExtendedKeyUsagePurpose::CodeSigning),
                Usage::EmailProtection => Some(ExtendedKeyUsagePurpose::EmailProtection),
                Usage::TimeStamping => Some(ExtendedKeyUsagePurpose::TimeStamping),
                Usage::OcspSigning => Some(ExtendedKeyUsagePurpose::OcspSigning),
                _ => None,
            })
            .collect()
    }

    /// (notBefore, notAfter) for a certificate issued at `now`
    fn validity(
        &self,
        now: time::OffsetDateTime,
    ) -> Result<(time::OffsetDateTime, time::OffsetDateTime)> {
        let out_of_range = || {
            AuthorityError::Signing(format!(
                "profile {} expiry of {}s is out of range",
                self.name,
                self.expiry.as_secs()
            ))
        };
        let skew = time::Duration::seconds(CLOCK_SKEW_ALLOWANCE.as_secs() as i64);
        let expiry = i64::try_from(self.expiry.as_secs())
            .map(time::Duration::seconds)
            .map_err(|_| out_of_range())?;
        let not_before = now.checked_sub(skew).ok_or_else(out_of_range)?;
        let not_after = now.checked_add(expiry).ok_or_else(out_of_range)?;
        Ok((not_before, not_after))
    }
}

/// File-backed CA signing with rcgen
pub struct SoftwareIssuer {
    label: String,
    /// CA key serialized as PEM (KeyPair isn't Clone, so it is parsed per signing)
    ca_key_pem: String,
    ca_cert_pem: String,
    chain_pem: String,
    profiles: HashMap<String, Profile>,
}

impl std::fmt::Debug for SoftwareIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareIssuer")
            .field("label", &self.label)
            .field("profiles", &self.profiles.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SoftwareIssuer {
    /// Create an issuer from PEM material, validating that key and cert load
    pub fn from_pem(
        label: impl Into<String>,
        cert_pem: &str,
        key_pem: &str,
        chain_pem: Option<&str>,
        profiles: impl IntoIterator<Item = Profile>,
    ) -> Result<Self> {
        let key = KeyPair::from_pem(key_pem)
            .map_err(|e| AuthorityError::Parse(format!("failed to parse CA key: {}", e)))?;
        parse_pem(cert_pem)?;
        CaIssuer::from_ca_cert_pem(cert_pem, &key)
            .map_err(|e| AuthorityError::Parse(format!("failed to load CA cert: {}", e)))?;

        let chain_pem = match chain_pem {
            Some(chain) if !chain.trim().is_empty() => {
                parse_pem(chain)?;
                chain.to_string()
            }
            _ => String::new(),
        };

        Ok(Self {
            label: label.into(),
            ca_key_pem: key_pem.to_string(),
            ca_cert_pem: cert_pem.to_string(),
            chain_pem,
            profiles: profiles
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
        })
    }

    /// Load an issuer's files from disk
    pub fn load(config: &IssuerConfig, profiles: impl IntoIterator<Item = Profile>) -> Result<Self> {
        let cert_pem = read(&config.cert_file)?;
        let key_pem = read(&config.key_file)?;
        let chain_pem = config.chain_file.as_deref().map(read).transpose()?;
        Self::from_pem(
            config.label.clone(),
            &cert_pem,
            &key_pem,
            chain_pem.as_deref(),
            profiles,
        )
    }

    /// Names of the profiles this issuer owns
    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    fn sign_blocking(&self, profile: &Profile, csr_pem: &str) -> Result<SignResult> {
        let mut csr_params = CertificateSigningRequestParams::from_pem(csr_pem)
            .map_err(|e| AuthorityError::InvalidCsr(format!("failed to parse CSR: {}", e)))?;

        // Subject and SANs come from the request; the profile owns the rest
        let params = &mut csr_params.params;
        params.is_ca = IsCa::NoCa;
        params.key_usages = profile.key_usages();
        params.extended_key_usages = profile.extended_key_usages();
        params.serial_number = Some(random_serial());
        params.use_authority_key_identifier_extension = true;
        let (not_before, not_after) = profile.validity(time::OffsetDateTime::now_utc())?;
        params.not_before = not_before;
        params.not_after = not_after;

        let ca_key = KeyPair::from_pem(&self.ca_key_pem)
            .map_err(|e| AuthorityError::Parse(format!("failed to load CA key: {}", e)))?;
        let issuer = CaIssuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| AuthorityError::Parse(format!("failed to create issuer: {}", e)))?;

        let signed = csr_params.signed_by(&issuer).map_err(|e| {
            AuthorityError::Signing(format!("failed to sign certificate: {}", e))
        })?;

        let certificate = CertificateSummary::from_der(signed.der().as_ref())?;
        Ok(SignResult {
            certificate,
            pem: signed.pem(),
        })
    }
}

#[async_trait]
impl Issuer for SoftwareIssuer {
    fn label(&self) -> &str {
        &self.label
    }

    fn chain_pem(&self) -> &str {
        &self.chain_pem
    }

    async fn sign(&self, request: &SignRequest) -> Result<SignResult> {
        let profile =
            self.profiles
                .get(&request.profile)
                .ok_or_else(|| AuthorityError::UnknownProfile {
                    issuer: self.label.clone(),
                    profile: request.profile.clone(),
                })?;

        let csr_pem = std::str::from_utf8(&request.request)
            .map_err(|e| AuthorityError::InvalidCsr(format!("request is not UTF-8 PEM: {}", e)))?;

        debug!(issuer = %self.label, profile = %profile.name, "signing certificate request");
        self.sign_blocking(profile, csr_pem)
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| AuthorityError::io(path, e))
}

/// 128-bit positive serial with the top bits pinned so DER never strips a byte
fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    SerialNumber::from_slice(&bytes)
}
