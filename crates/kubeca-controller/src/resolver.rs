//! Signer name resolution
//!
//! A signer name has the form `<issuerLabel>/<profileName>`. The profile picks
//! the issuer; the label half must then match that issuer exactly, so a
//! request cannot borrow a profile from an issuer it did not name.

use std::fmt;
use std::sync::Arc;

use kubeca_authority::{Issuer, IssuerDirectory};

/// An issuer and the profile to sign under
#[derive(Clone)]
pub struct ResolvedSigner {
    /// Issuer that owns the profile
    pub issuer: Arc<dyn Issuer>,
    /// Profile name
    pub profile: String,
}

impl fmt::Debug for ResolvedSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSigner")
            .field("issuer", &self.issuer.label())
            .field("profile", &self.profile)
            .finish()
    }
}

/// Why a signer name did not resolve. Never an error: the request is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    /// Not exactly two `/`-separated tokens
    Malformed {
        /// Number of tokens found
        tokens: usize,
    },
    /// No issuer owns the profile
    UnknownProfile {
        /// Requested profile
        profile: String,
    },
    /// The profile exists but belongs to a differently labeled issuer
    LabelMismatch {
        /// Label named in the signer name
        claimed: String,
        /// Label of the issuer that owns the profile
        actual: String,
    },
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { tokens } => {
                write!(f, "expected <issuer>/<profile>, found {} token(s)", tokens)
            }
            Self::UnknownProfile { profile } => write!(f, "no issuer owns profile {}", profile),
            Self::LabelMismatch { claimed, actual } => write!(
                f,
                "profile belongs to issuer {}, signer names {}",
                actual, claimed
            ),
        }
    }
}

/// Resolve `signer_name` against the directory
pub fn resolve_signer(
    directory: &dyn IssuerDirectory,
    signer_name: &str,
) -> Result<ResolvedSigner, Unresolved> {
    let tokens: Vec<&str> = signer_name.split('/').collect();
    let [label, profile] = tokens.as_slice() else {
        return Err(Unresolved::Malformed {
            tokens: tokens.len(),
        });
    };

    let issuer = directory
        .issuer_for_profile(profile)
        .ok_or_else(|| Unresolved::UnknownProfile {
            profile: profile.to_string(),
        })?;

    if issuer.label() != *label {
        return Err(Unresolved::LabelMismatch {
            claimed: label.to_string(),
            actual: issuer.label().to_string(),
        });
    }

    Ok(ResolvedSigner {
        issuer,
        profile: profile.to_string(),
    })
}
