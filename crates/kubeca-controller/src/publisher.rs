//! Status publishing
//!
//! The only write the controller makes is `status.certificate`. The patch is
//! built from the snapshot read at the start of the attempt and carries its
//! resourceVersion, so the API server rejects it with 409 if anything changed
//! in between.

use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::ByteString;
use serde_json::{json, Value};

/// Leaf followed by the issuer's trailing chain, each trimmed
pub fn published_certificate(leaf_pem: &str, chain_pem: &str) -> String {
    let leaf = leaf_pem.trim();
    let chain = chain_pem.trim();
    if chain.is_empty() {
        leaf.to_string()
    } else {
        format!("{}\n{}", leaf, chain)
    }
}

/// Merge patch setting `status.certificate`, guarded by the snapshot's resourceVersion
pub fn status_merge_patch(snapshot: &CertificateSigningRequest, certificate: &[u8]) -> Value {
    let status = json!({
        "certificate": ByteString(certificate.to_vec())
    });
    match snapshot.metadata.resource_version.as_deref() {
        Some(rv) => json!({
            "metadata": { "resourceVersion": rv },
            "status": status
        }),
        None => json!({ "status": status }),
    }
}
