//! Issuer directory: profile name to owning issuer
//!
//! The directory is built once at startup and never changes; hot reload is
//! not supported.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::AuthorityConfig;
use crate::error::{AuthorityError, Result};
use crate::issuer::{Issuer, Profile, SoftwareIssuer};

/// Lookup from profile name to the issuer that owns it
pub trait IssuerDirectory: Send + Sync {
    /// Issuer owning `profile`, if any
    fn issuer_for_profile(&self, profile: &str) -> Option<Arc<dyn Issuer>>;
}

/// The configured set of issuers
pub struct Authority {
    issuers: BTreeMap<String, Arc<dyn Issuer>>,
    profiles: HashMap<String, Arc<dyn Issuer>>,
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authority")
            .field("issuers", &self.issuers.keys().collect::<Vec<_>>())
            .field("profiles", &self.profiles.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Authority {
    /// Start an empty builder
    pub fn builder() -> AuthorityBuilder {
        AuthorityBuilder::default()
    }

    /// Load the config file and every issuer it names
    pub fn load(path: &Path) -> Result<Self> {
        let config = AuthorityConfig::load(path)?;
        Self::from_config(&config)
    }

    /// Build software issuers for every configured issuer
    pub fn from_config(config: &AuthorityConfig) -> Result<Self> {
        let mut builder = Self::builder();
        for issuer_config in &config.issuers {
            let profiles: Vec<Profile> = config
                .profiles_for(&issuer_config.label)
                .map(|(name, p)| Profile::from_config(name, p))
                .collect::<Result<_>>()?;
            let issuer = SoftwareIssuer::load(issuer_config, profiles)?;
            info!(
                issuer = %issuer_config.label,
                profiles = ?issuer.profile_names().collect::<Vec<_>>(),
                chain = !issuer.chain_pem().is_empty(),
                "loaded issuer"
            );
            builder = builder.issuer(Arc::new(issuer));
        }
        for (name, profile) in &config.profiles {
            builder = builder.profile(name.clone(), profile.issuer_label.clone());
        }
        builder.build()
    }

    /// Issuer with the given label
    pub fn issuer(&self, label: &str) -> Option<Arc<dyn Issuer>> {
        self.issuers.get(label).cloned()
    }

    /// Configured issuer labels, sorted
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.issuers.keys().map(String::as_str)
    }

    /// Number of configured profiles
    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }
}

impl IssuerDirectory for Authority {
    fn issuer_for_profile(&self, profile: &str) -> Option<Arc<dyn Issuer>> {
        self.profiles.get(profile).cloned()
    }
}

/// Builder validating that every profile maps to exactly one known issuer
#[derive(Default)]
pub struct AuthorityBuilder {
    issuers: Vec<Arc<dyn Issuer>>,
    profiles: Vec<(String, String)>,
}

impl AuthorityBuilder {
    /// Add an issuer
    pub fn issuer(mut self, issuer: Arc<dyn Issuer>) -> Self {
        self.issuers.push(issuer);
        self
    }

    /// Map `profile` to the issuer labeled `issuer_label`
    pub fn profile(mut self, profile: impl Into<String>, issuer_label: impl Into<String>) -> Self {
        self.profiles.push((profile.into(), issuer_label.into()));
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<Authority> {
        let mut issuers = BTreeMap::new();
        for issuer in self.issuers {
            let label = issuer.label().to_string();
            if issuers.insert(label.clone(), issuer).is_some() {
                return Err(AuthorityError::InvalidConfig(format!(
                    "duplicate issuer label {}",
                    label
                )));
            }
        }

        let mut profiles = HashMap::new();
        for (profile, label) in self.profiles {
            let issuer = issuers.get(&label).cloned().ok_or_else(|| {
                AuthorityError::InvalidConfig(format!(
                    "profile {} references unknown issuer {}",
                    profile, label
                ))
            })?;
            if profiles.insert(profile.clone(), issuer).is_some() {
                return Err(AuthorityError::InvalidConfig(format!(
                    "profile {} is owned by more than one issuer",
                    profile
                )));
            }
        }

        Ok(Authority { issuers, profiles })
    }
}
