//! Store access for the reconciler
//!
//! The reconciler talks to the cluster only through [`CsrClient`], so tests
//! can substitute an in-memory store or a mock.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use kubeca_common::events::{normal_event, EventPublisher, KubeEventPublisher};
use kubeca_common::{Error, CONTROLLER_NAME, FIELD_MANAGER};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::publisher::status_merge_patch;

/// Narrow view of the API server used by the reconciler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CsrClient: Send + Sync {
    /// Read the current object from the API server (not a cache)
    async fn fetch(&self, name: &str) -> Result<Option<CertificateSigningRequest>, Error>;

    /// Set `status.certificate`, conditional on the snapshot's resourceVersion
    ///
    /// Returns [`Error::PublishConflict`] when the snapshot is stale.
    async fn patch_status(
        &self,
        snapshot: &CertificateSigningRequest,
        certificate: &[u8],
    ) -> Result<(), Error>;

    /// Attach a Normal event to the request. Never fails.
    async fn emit_event(&self, csr: &CertificateSigningRequest, reason: &str, note: &str);
}

/// Production client backed by kube-rs
pub struct KubeCsrClient {
    api: Api<CertificateSigningRequest>,
    events: Arc<dyn EventPublisher>,
}

impl KubeCsrClient {
    /// Create a client reporting events as the kubeca controller
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client.clone()),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
        }
    }
}

#[async_trait]
impl CsrClient for KubeCsrClient {
    async fn fetch(&self, name: &str) -> Result<Option<CertificateSigningRequest>, Error> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn patch_status(
        &self,
        snapshot: &CertificateSigningRequest,
        certificate: &[u8],
    ) -> Result<(), Error> {
        let name = snapshot.name_any();
        let patch = status_merge_patch(snapshot, certificate);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        self.api
            .patch_status(&name, &params, &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| map_patch_error(name, e))
    }

    async fn emit_event(&self, csr: &CertificateSigningRequest, reason: &str, note: &str) {
        self.events
            .publish(&csr.object_ref(&()), normal_event(reason, note))
            .await;
    }
}

/// A 409 means the resourceVersion precondition failed; anything else is a
/// plain API or transport failure
fn map_patch_error(name: String, error: kube::Error) -> Error {
    match error {
        kube::Error::Api(ae) if ae.code == 409 => {
            debug!(csr = %name, "status patch rejected: stale resourceVersion");
            Error::publish_conflict(name)
        }
        e => e.into(),
    }
}
