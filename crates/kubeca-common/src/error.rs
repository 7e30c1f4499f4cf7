//! Error types for the kubeca controller
//!
//! Errors are structured with fields to aid debugging in production.
//! Variants carry the request name, issuer label or profile involved so the
//! reconcile log line alone is enough to find the failing object.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for kubeca operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error (fetch or publish transport failure)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The authority failed to sign a request
    #[error("signing error [{issuer}/{profile}]: {message}")]
    Signing {
        /// Label of the issuer that was asked to sign
        issuer: String,
        /// Profile the request was signed under
        profile: String,
        /// Description of what failed
        message: String,
    },

    /// Status publish was rejected because the base snapshot was stale
    #[error("publish conflict for {name}: object changed since it was read")]
    PublishConflict {
        /// Name of the CertificateSigningRequest
        name: String,
    },

    /// Deadline expired or shutdown was requested before the attempt completed
    #[error("reconcile of {name} cancelled before {stage}")]
    Cancelled {
        /// Name of the CertificateSigningRequest
        name: String,
        /// Stage that was about to run (e.g. "signing", "publishing")
        stage: String,
    },

    /// Process could not start (authority or configuration load failure)
    #[error("startup error [{context}]: {message}")]
    Startup {
        /// Description of what failed
        message: String,
        /// Component that failed to start (e.g. "authority", "leader-election")
        context: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "controller")
        context: String,
    },
}

impl Error {
    /// Create a signing error for an issuer/profile pair
    pub fn signing(
        issuer: impl Into<String>,
        profile: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Signing {
            issuer: issuer.into(),
            profile: profile.into(),
            message: msg.into(),
        }
    }

    /// Create a publish conflict for the named request
    pub fn publish_conflict(name: impl Into<String>) -> Self {
        Self::PublishConflict { name: name.into() }
    }

    /// Create a cancellation error for the named request and stage
    pub fn cancelled(name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::Cancelled {
            name: name.into(),
            stage: stage.into(),
        }
    }

    /// Create a startup error without specific context
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create a startup error with the failing component as context
    pub fn startup_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Startup {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Every per-object failure is requeued; this only distinguishes transient
    /// failures from ones that need an operator (bad RBAC, invalid patch).
    /// Startup errors are never retried: the process exits.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    !(400..500).contains(&ae.code) || matches!(ae.code, 408 | 409 | 429)
                }
                _ => true,
            },
            Error::Signing { .. } => true,
            Error::PublishConflict { .. } => true,
            Error::Cancelled { .. } => true,
            Error::Startup { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the request name if this error is tied to one object
    pub fn request_name(&self) -> Option<&str> {
        match self {
            Error::PublishConflict { name } => Some(name),
            Error::Cancelled { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Startup { context, .. } => Some(context),
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    // ==========================================================================
    // Story Tests: Error Propagation in the Signing Flow
    // ==========================================================================
    //
    // Each variant maps to one outcome of a reconcile attempt. Everything a
    // single object can hit is retried; only startup failures stop the process.

    /// Story: A failing authority names the issuer and profile involved
    #[test]
    fn story_signing_error_names_issuer_and_profile() {
        let err = Error::signing("root-ca", "web", "key rejected");
        let msg = err.to_string();
        assert!(msg.contains("root-ca/web"));
        assert!(msg.contains("key rejected"));
        assert!(err.is_retryable());
        assert_eq!(err.request_name(), None);
    }

    /// Story: A stale publish surfaces as a distinct retryable conflict
    ///
    /// Another writer touched the request between our read and our patch.
    /// The next attempt re-reads and the idempotence guard takes over.
    #[test]
    fn story_publish_conflict_is_retryable() {
        let err = Error::publish_conflict("csr-1");
        assert!(err.is_retryable());
        assert_eq!(err.request_name(), Some("csr-1"));
        assert!(err.to_string().contains("csr-1"));
    }

    /// Story: Deadline or shutdown aborts an attempt before the next stage
    #[test]
    fn story_cancellation_reports_stage() {
        let err = Error::cancelled("csr-2", "publishing");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("before publishing"));
        assert_eq!(err.request_name(), Some("csr-2"));
    }

    /// Story: Startup failures stop the process instead of retrying
    #[test]
    fn story_startup_errors_are_fatal() {
        let err = Error::startup_with_context("authority", "ca cert not found");
        assert!(!err.is_retryable());
        assert_eq!(err.context(), Some("authority"));
        assert!(err.to_string().contains("[authority]"));

        let err = Error::startup("bad flags");
        assert_eq!(err.context(), Some(UNKNOWN_CONTEXT));
    }

    /// Story: API errors are classified by status code
    #[test]
    fn story_kube_errors_classified_by_status() {
        let server: Error = api_error(500).into();
        assert!(server.is_retryable());

        let throttled: Error = api_error(429).into();
        assert!(throttled.is_retryable());

        let conflict: Error = api_error(409).into();
        assert!(conflict.is_retryable());

        let forbidden: Error = api_error(403).into();
        assert!(!forbidden.is_retryable());

        let invalid: Error = api_error(422).into();
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_internal_error_with_context() {
        let err = Error::internal_with_context("reconciler", "unexpected state");
        assert!(err.is_retryable());
        assert_eq!(err.context(), Some("reconciler"));
        assert!(err.to_string().contains("[reconciler]"));
    }

    #[test]
    fn test_internal_error_default_context() {
        let err = Error::internal("unexpected state");
        assert_eq!(err.context(), Some(UNKNOWN_CONTEXT));
        assert!(err.to_string().contains("[unknown]"));
    }
}
