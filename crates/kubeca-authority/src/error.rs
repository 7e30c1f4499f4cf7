//! Authority errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading an authority or signing with it
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// Configuration is structurally valid YAML but semantically wrong
    #[error("invalid authority config: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed
    #[error("failed to parse authority config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A configured file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed to load
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The request is not a valid PEM certificate signing request
    #[error("invalid CSR: {0}")]
    InvalidCsr(String),

    /// The issuer does not own the requested profile
    #[error("issuer {issuer} has no profile {profile}")]
    UnknownProfile {
        /// Issuer label
        issuer: String,
        /// Requested profile
        profile: String,
    },

    /// Certificate generation failed
    #[error("certificate generation failed: {0}")]
    Signing(String),

    /// Certificate or key parsing error
    #[error("certificate parsing error: {0}")]
    Parse(String),
}

impl AuthorityError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for authority operations
pub type Result<T> = std::result::Result<T, AuthorityError>;
