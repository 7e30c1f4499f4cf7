//! Authority configuration file
//!
//! ```yaml
//! issuers:
//!   - label: root-ca
//!     cert_file: /kubeca/certs/root-ca.pem
//!     key_file: /kubeca/certs/root-ca.key
//!     chain_file: /kubeca/certs/root-ca-chain.pem
//! profiles:
//!   web:
//!     issuer_label: root-ca
//!     expiry_hours: 2160
//!     usages: [digital_signature, key_encipherment, server_auth]
//! ```
//!
//! Relative file paths are resolved against the directory holding the config.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AuthorityError, Result};

/// Longest profile lifetime accepted, roughly a century
pub const MAX_EXPIRY_HOURS: u64 = 100 * 366 * 24;

/// Top-level authority configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorityConfig {
    /// Configured signing authorities
    pub issuers: Vec<IssuerConfig>,
    /// Policy profiles keyed by name
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// One signing authority backed by files on disk
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuerConfig {
    /// Stable label; the first half of a signer name
    pub label: String,
    /// CA certificate (PEM)
    pub cert_file: PathBuf,
    /// CA private key (PEM)
    pub key_file: PathBuf,
    /// Intermediates appended to every issued leaf (PEM)
    #[serde(default)]
    pub chain_file: Option<PathBuf>,
}

/// A named policy template owned by one issuer
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    /// Label of the owning issuer
    pub issuer_label: String,
    /// Lifetime of issued certificates
    pub expiry_hours: u64,
    /// Key usages and extended key usages stamped on issued certificates
    #[serde(default)]
    pub usages: Vec<Usage>,
}

/// Certificate usage, covering both key usage and extended key usage bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Usage {
    /// keyUsage digitalSignature
    DigitalSignature,
    /// keyUsage contentCommitment (nonRepudiation)
    ContentCommitment,
    /// keyUsage keyEncipherment
    KeyEncipherment,
    /// keyUsage dataEncipherment
    DataEncipherment,
    /// keyUsage keyAgreement
    KeyAgreement,
    /// extKeyUsage serverAuth
    ServerAuth,
    /// extKeyUsage clientAuth
    ClientAuth,
    /// extKeyUsage codeSigning
    CodeSigning,
    /// extKeyUsage emailProtection
    EmailProtection,
    /// extKeyUsage timeStamping
    TimeStamping,
    /// extKeyUsage OCSPSigning
    OcspSigning,
}

impl AuthorityConfig {
    /// Read, parse and validate a config file, resolving relative paths
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AuthorityError::io(path, e))?;
        let mut config = Self::from_yaml(&raw)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse and validate a config document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-references between issuers and profiles
    pub fn validate(&self) -> Result<()> {
        if self.issuers.is_empty() {
            return Err(AuthorityError::InvalidConfig(
                "at least one issuer is required".to_string(),
            ));
        }

        let mut labels = HashSet::new();
        for issuer in &self.issuers {
            if issuer.label.is_empty() {
                return Err(AuthorityError::InvalidConfig(
                    "issuer label must not be empty".to_string(),
                ));
            }
            if issuer.label.contains('/') {
                return Err(AuthorityError::InvalidConfig(format!(
                    "issuer label {} must not contain '/'",
                    issuer.label
                )));
            }
            if !labels.insert(issuer.label.as_str()) {
                return Err(AuthorityError::InvalidConfig(format!(
                    "duplicate issuer label {}",
                    issuer.label
                )));
            }
        }

        for (name, profile) in &self.profiles {
            if name.is_empty() || name.contains('/') {
                return Err(AuthorityError::InvalidConfig(format!(
                    "profile name {:?} must be non-empty and must not contain '/'",
                    name
                )));
            }
            if !labels.contains(profile.issuer_label.as_str()) {
                return Err(AuthorityError::InvalidConfig(format!(
                    "profile {} references unknown issuer {}",
                    name, profile.issuer_label
                )));
            }
            if profile.expiry_hours == 0 {
                return Err(AuthorityError::InvalidConfig(format!(
                    "profile {} must have expiry_hours > 0",
                    name
                )));
            }
            if profile.expiry_hours > MAX_EXPIRY_HOURS {
                return Err(AuthorityError::InvalidConfig(format!(
                    "profile {} expiry_hours {} exceeds the maximum of {}",
                    name, profile.expiry_hours, MAX_EXPIRY_HOURS
                )));
            }
        }

        Ok(())
    }

    /// Profiles owned by the issuer with `label`
    pub fn profiles_for<'a>(
        &'a self,
        label: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a ProfileConfig)> + 'a {
        self.profiles
            .iter()
            .filter(move |(_, p)| p.issuer_label == label)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for issuer in &mut self.issuers {
            resolve(&mut issuer.cert_file);
            resolve(&mut issuer.key_file);
            if let Some(chain) = issuer.chain_file.as_mut() {
                resolve(chain);
            }
        }
    }
}
