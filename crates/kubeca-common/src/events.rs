//! Audit Events attached to CertificateSigningRequests
//!
//! Events show up in `kubectl describe csr`. Publishing is best effort: a
//! failure is logged and swallowed, since the certificate it describes has
//! already been published.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Reason strings
pub mod reasons {
    /// The request was signed and the certificate published
    pub const SIGNED: &str = "Signed";
}

/// Action strings
pub mod actions {
    /// Signing a certificate request
    pub const SIGN: &str = "Sign";
}

/// Note attached to `Signed` events
pub const SIGNED_NOTE: &str = "The CSR has been signed";

/// Build a Normal event for a signing action
pub fn normal_event(reason: &str, note: &str) -> Event {
    Event {
        type_: EventType::Normal,
        reason: reason.to_string(),
        note: (!note.is_empty()).then(|| note.to_string()),
        action: actions::SIGN.to_string(),
        secondary: None,
    }
}

/// Sink for Kubernetes Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `event` about `target`. Never fails.
    async fn publish(&self, target: &ObjectReference, event: Event);
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Report as `controller`, with the pod name (if known) as the instance
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, target: &ObjectReference, event: Event) {
        if let Err(e) = self.recorder.publish(&event, target).await {
            warn!(
                object = ?target.name,
                reason = %event.reason,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}
