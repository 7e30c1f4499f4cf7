//! Eligibility guard chain
//!
//! Evaluated in order on a freshly fetched request; the first guard that
//! matches decides. Pure: no I/O, no clock.

use std::fmt;

use k8s_openapi::api::certificates::v1::CertificateSigningRequest;

/// Condition type marking a request approved
pub const APPROVED: &str = "Approved";

/// Condition type marking a request denied
pub const DENIED: &str = "Denied";

/// How requests without an approval decision are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Sign unless denied; no condition at all counts as approved
    #[default]
    Implicit,
    /// Sign only requests carrying an `Approved` condition
    RequireExplicit,
}

/// Why a request was not signed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Deletion timestamp is set
    Deleted,
    /// `spec.signerName` is empty
    MissingSignerName,
    /// `status.certificate` is already populated
    AlreadySigned,
    /// A `Denied` condition is present
    Denied,
    /// No `Approved` condition under [`ApprovalPolicy::RequireExplicit`]
    NotApproved,
}

impl SkipReason {
    /// Routine skips log at debug; the rest at info
    pub fn is_routine(&self) -> bool {
        matches!(self, Self::Deleted | Self::AlreadySigned)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deleted => "request is being deleted",
            Self::MissingSignerName => "request has no signer name",
            Self::AlreadySigned => "request is already signed",
            Self::Denied => "request was denied",
            Self::NotApproved => "request is not approved",
        })
    }
}

/// Result of the guard chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Do nothing
    Skip(SkipReason),
    /// Resolve the signer and sign
    Proceed,
}

/// Run the guard chain against `csr`
pub fn evaluate(csr: &CertificateSigningRequest, policy: ApprovalPolicy) -> Decision {
    if csr.metadata.deletion_timestamp.is_some() {
        return Decision::Skip(SkipReason::Deleted);
    }
    if csr.spec.signer_name.is_empty() {
        return Decision::Skip(SkipReason::MissingSignerName);
    }
    if is_signed(csr) {
        return Decision::Skip(SkipReason::AlreadySigned);
    }
    if has_condition(csr, DENIED) {
        return Decision::Skip(SkipReason::Denied);
    }
    if policy == ApprovalPolicy::RequireExplicit && !has_condition(csr, APPROVED) {
        return Decision::Skip(SkipReason::NotApproved);
    }
    Decision::Proceed
}

/// Whether `status.certificate` holds any bytes
pub fn is_signed(csr: &CertificateSigningRequest) -> bool {
    csr.status
        .as_ref()
        .and_then(|s| s.certificate.as_ref())
        .is_some_and(|c| !c.0.is_empty())
}

/// Condition presence is decided by type alone; `status` is not consulted.
fn has_condition(csr: &CertificateSigningRequest, type_: &str) -> bool {
    csr.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| conditions.iter().any(|c| c.type_ == type_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::certificates::v1::{
        CertificateSigningRequestCondition, CertificateSigningRequestSpec,
        CertificateSigningRequestStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use k8s_openapi::ByteString;

    fn csr(signer: &str, conditions: &[&str]) -> CertificateSigningRequest {
        CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some("csr-1".to_string()),
                ..Default::default()
            },
            spec: CertificateSigningRequestSpec {
                signer_name: signer.to_string(),
                request: ByteString(b"-----BEGIN CERTIFICATE REQUEST-----".to_vec()),
                ..Default::default()
            },
            status: Some(CertificateSigningRequestStatus {
                conditions: Some(
                    conditions
                        .iter()
                        .map(|t| CertificateSigningRequestCondition {
                            type_: t.to_string(),
                            status: "True".to_string(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                certificate: None,
            }),
        }
    }

    fn signed(mut csr: CertificateSigningRequest, bytes: &[u8]) -> CertificateSigningRequest {
        if let Some(status) = csr.status.as_mut() {
            status.certificate = Some(ByteString(bytes.to_vec()));
        }
        csr
    }

    /// Story: Approval matrix under the default implicit policy
    #[test]
    fn story_implicit_policy_matrix() {
        let p = ApprovalPolicy::Implicit;
        assert_eq!(evaluate(&csr("ca/web", &[]), p), Decision::Proceed);
        assert_eq!(evaluate(&csr("ca/web", &[APPROVED]), p), Decision::Proceed);
        assert_eq!(
            evaluate(&csr("ca/web", &[DENIED]), p),
            Decision::Skip(SkipReason::Denied)
        );
        assert_eq!(
            evaluate(&csr("ca/web", &[APPROVED, DENIED]), p),
            Decision::Skip(SkipReason::Denied)
        );
    }

    /// Story: Strict policy refuses requests nobody approved
    #[test]
    fn story_explicit_policy_matrix() {
        let p = ApprovalPolicy::RequireExplicit;
        assert_eq!(
            evaluate(&csr("ca/web", &[]), p),
            Decision::Skip(SkipReason::NotApproved)
        );
        assert_eq!(evaluate(&csr("ca/web", &[APPROVED]), p), Decision::Proceed);
        assert_eq!(
            evaluate(&csr("ca/web", &[DENIED]), p),
            Decision::Skip(SkipReason::Denied)
        );
        assert_eq!(
            evaluate(&csr("ca/web", &[APPROVED, DENIED]), p),
            Decision::Skip(SkipReason::Denied)
        );
    }

    /// Story: Deletion wins over every other guard
    #[test]
    fn story_deleted_request_never_signed() {
        let mut request = csr("", &[DENIED]);
        request.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        assert_eq!(
            evaluate(&request, ApprovalPolicy::Implicit),
            Decision::Skip(SkipReason::Deleted)
        );
    }

    #[test]
    fn empty_signer_checked_before_signed_state() {
        let request = signed(csr("", &[]), b"CERT");
        assert_eq!(
            evaluate(&request, ApprovalPolicy::Implicit),
            Decision::Skip(SkipReason::MissingSignerName)
        );
    }

    #[test]
    fn already_signed_checked_before_denial() {
        let request = signed(csr("ca/web", &[DENIED]), b"CERT");
        assert_eq!(
            evaluate(&request, ApprovalPolicy::Implicit),
            Decision::Skip(SkipReason::AlreadySigned)
        );
    }

    #[test]
    fn empty_certificate_bytes_are_not_signed() {
        let request = signed(csr("ca/web", &[]), b"");
        assert!(!is_signed(&request));
        assert_eq!(
            evaluate(&request, ApprovalPolicy::Implicit),
            Decision::Proceed
        );
    }

    #[test]
    fn condition_status_is_not_consulted() {
        let mut request = csr("ca/web", &[DENIED]);
        if let Some(conditions) = request
            .status
            .as_mut()
            .and_then(|s| s.conditions.as_mut())
        {
            conditions[0].status = "False".to_string();
        }
        assert_eq!(
            evaluate(&request, ApprovalPolicy::Implicit),
            Decision::Skip(SkipReason::Denied)
        );
    }

    #[test]
    fn missing_status_is_implicitly_approved() {
        let mut request = csr("ca/web", &[]);
        request.status = None;
        assert_eq!(
            evaluate(&request, ApprovalPolicy::Implicit),
            Decision::Proceed
        );
        assert_eq!(
            evaluate(&request, ApprovalPolicy::RequireExplicit),
            Decision::Skip(SkipReason::NotApproved)
        );
    }

    #[test]
    fn routine_skips() {
        assert!(SkipReason::Deleted.is_routine());
        assert!(SkipReason::AlreadySigned.is_routine());
        assert!(!SkipReason::Denied.is_routine());
        assert!(!SkipReason::MissingSignerName.is_routine());
    }
}
