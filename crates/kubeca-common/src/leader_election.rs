//! Lease-based leader election
//!
//! Only one kubeca replica signs at a time. Replicas compete for a
//! coordination.k8s.io/v1 Lease; the holder runs the controller and the rest
//! poll until the lease expires or is released.
//!
//! Every write carries the resourceVersion that was read, so a lease that
//! changed in between is rejected with 409 and the claim is simply lost for
//! this round.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default lease name, shared with earlier kubeca deployments
pub const DEFAULT_LEASE_NAME: &str = "kube-ca-leader-election";

/// Leader election errors
#[derive(Debug, Error)]
pub enum LeaderElectionError {
    /// Kubernetes API error
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The server returned a lease without a resourceVersion
    #[error("lease {0} has no resourceVersion")]
    MissingResourceVersion(String),
}

/// Lease timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseTiming {
    /// How long a holder may go without renewing before others take over
    pub lease_duration: Duration,
    /// How often the holder renews
    pub renew_interval: Duration,
    /// How often a standby retries
    pub retry_interval: Duration,
}

impl Default for LeaseTiming {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(30),
            renew_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(5),
        }
    }
}

/// What a replica should write, given the lease it just read
#[derive(Debug, Clone, PartialEq, Eq)]
enum Claim {
    /// No lease exists yet
    Create,
    /// We hold it; bump renewTime
    Renew { resource_version: String },
    /// Someone else held it and it expired (or was released)
    TakeOver {
        resource_version: String,
        transitions: i32,
    },
    /// Someone else holds a live lease
    HeldBy(String),
}

/// Competes for and renews a single Lease
pub struct LeaderElector {
    api: Api<Lease>,
    lease_name: String,
    namespace: String,
    identity: String,
    timing: LeaseTiming,
}

impl LeaderElector {
    /// Create an elector with default timing (30s lease, 10s renew, 5s retry)
    pub fn new(client: Client, lease_name: &str, namespace: &str, identity: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            lease_name: lease_name.to_string(),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            timing: LeaseTiming::default(),
        }
    }

    /// Block until leadership is acquired
    ///
    /// The returned guard keeps renewing; [`LeaderGuard::lost`] resolves when
    /// a renewal is rejected or renewals keep failing past the lease duration.
    pub async fn acquire(self: Arc<Self>) -> Result<LeaderGuard, LeaderElectionError> {
        loop {
            match self.try_claim().await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => warn!(
                    identity = %self.identity,
                    lease = %self.lease_name,
                    error = %e,
                    "Lease claim failed, retrying"
                ),
            }
            tokio::time::sleep(self.timing.retry_interval).await;
        }

        info!(identity = %self.identity, lease = %self.lease_name, "Leadership acquired");

        let (lost_tx, lost_rx) = oneshot::channel();
        let renewal_task = tokio::spawn(Arc::clone(&self).keep_renewing(lost_tx));
        Ok(LeaderGuard {
            elector: self,
            renewal_task,
            lost_rx: Some(lost_rx),
        })
    }

    /// Read the lease and write our claim if it is ours to take
    ///
    /// `Ok(false)` means another replica holds it or won the race.
    async fn try_claim(&self) -> Result<bool, LeaderElectionError> {
        let current = self.api.get_opt(&self.lease_name).await?;
        let now = Utc::now();

        let claim = classify(current.as_ref(), &self.identity, now).ok_or_else(|| {
            LeaderElectionError::MissingResourceVersion(self.lease_name.clone())
        })?;

        let written = match &claim {
            Claim::HeldBy(holder) => {
                debug!(identity = %self.identity, holder = %holder, "Lease held by another replica");
                return Ok(false);
            }
            Claim::Create => {
                let lease = self.lease(None, self.holder_spec(now, now, 0));
                self.api.create(&PostParams::default(), &lease).await
            }
            Claim::Renew { resource_version } => {
                let spec = current.as_ref().and_then(|l| l.spec.as_ref());
                let acquired = spec
                    .and_then(|s| s.acquire_time.as_ref())
                    .map(|t| t.0)
                    .unwrap_or(now);
                let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);
                let lease = self.lease(
                    Some(resource_version.clone()),
                    self.holder_spec(acquired, now, transitions),
                );
                self.api
                    .replace(&self.lease_name, &PostParams::default(), &lease)
                    .await
            }
            Claim::TakeOver {
                resource_version,
                transitions,
            } => {
                let lease = self.lease(
                    Some(resource_version.clone()),
                    self.holder_spec(now, now, transitions + 1),
                );
                self.api
                    .replace(&self.lease_name, &PostParams::default(), &lease)
                    .await
            }
        };

        match written {
            Ok(_) => {
                match claim {
                    Claim::Renew { .. } => debug!(identity = %self.identity, "Lease renewed"),
                    Claim::TakeOver { transitions, .. } => info!(
                        identity = %self.identity,
                        transitions = transitions + 1,
                        "Took over expired lease"
                    ),
                    _ => info!(identity = %self.identity, "Created lease"),
                }
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "Lease changed underneath us");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn lease(&self, resource_version: Option<String>, spec: LeaseSpec) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                resource_version,
                ..Default::default()
            },
            spec: Some(spec),
        }
    }

    fn holder_spec(&self, acquired: DateTime<Utc>, now: DateTime<Utc>, transitions: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.timing.lease_duration.as_secs() as i32),
            acquire_time: Some(MicroTime(acquired)),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..Default::default()
        }
    }

    /// Renew until a renewal is rejected or the lease would have expired
    async fn keep_renewing(self: Arc<Self>, lost_tx: oneshot::Sender<()>) {
        let mut expires = Instant::now() + self.timing.lease_duration;
        loop {
            tokio::time::sleep(self.timing.renew_interval).await;

            match self.try_claim().await {
                Ok(true) => expires = Instant::now() + self.timing.lease_duration,
                Ok(false) => {
                    warn!(identity = %self.identity, "Lease taken by another replica");
                    break;
                }
                Err(e) if Instant::now() < expires => {
                    warn!(identity = %self.identity, error = %e, "Lease renewal failed, will retry");
                }
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "Lease expired while renewals failed");
                    break;
                }
            }
        }

        let _ = lost_tx.send(());
    }

    /// Clear the holder so a standby can take over without waiting for expiry
    async fn release(&self) -> Result<(), LeaderElectionError> {
        let Some(lease) = self.api.get_opt(&self.lease_name).await? else {
            return Ok(());
        };
        let holder = lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref());
        if holder != Some(self.identity.as_str()) {
            debug!(identity = %self.identity, holder = ?holder, "Not the holder, nothing to release");
            return Ok(());
        }

        let patch = json!({
            "metadata": { "resourceVersion": lease.metadata.resource_version },
            "spec": {
                "holderIdentity": null,
                "renewTime": MicroTime(Utc::now() - chrono::Duration::seconds(60)),
            }
        });
        self.api
            .patch(&self.lease_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        info!(identity = %self.identity, lease = %self.lease_name, "Lease released");
        Ok(())
    }
}

/// Decide what to write given the current lease
///
/// Returns None when an existing lease lacks a resourceVersion, since no
/// conditional write is possible.
fn classify(lease: Option<&Lease>, identity: &str, now: DateTime<Utc>) -> Option<Claim> {
    let Some(lease) = lease else {
        return Some(Claim::Create);
    };
    let spec = lease.spec.as_ref();
    let holder = spec.and_then(|s| s.holder_identity.as_deref());

    if holder != Some(identity) && !lease_expired(spec, now) {
        if let Some(holder) = holder {
            return Some(Claim::HeldBy(holder.to_string()));
        }
    }

    let resource_version = lease.metadata.resource_version.clone()?;
    if holder == Some(identity) {
        Some(Claim::Renew { resource_version })
    } else {
        Some(Claim::TakeOver {
            resource_version,
            transitions: spec.and_then(|s| s.lease_transitions).unwrap_or(0),
        })
    }
}

/// A lease without a renew time or duration is treated as expired
fn lease_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    let renewed = spec.and_then(|s| s.renew_time.as_ref());
    let duration = spec.and_then(|s| s.lease_duration_seconds);
    match (renewed, duration) {
        (Some(renewed), Some(secs)) => now > renewed.0 + chrono::Duration::seconds(secs as i64),
        _ => true,
    }
}

/// Held leadership
///
/// Renewal runs in the background until the guard is dropped.
pub struct LeaderGuard {
    elector: Arc<LeaderElector>,
    renewal_task: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<()>>,
}

impl LeaderGuard {
    /// Resolves once leadership is lost
    pub async fn lost(&mut self) {
        if let Some(rx) = self.lost_rx.take() {
            let _ = rx.await;
        }
    }

    /// Stop renewing and clear the lease holder
    ///
    /// Call after the controller has stopped.
    pub async fn release_leadership(&self) -> Result<(), LeaderElectionError> {
        self.renewal_task.abort();
        self.elector.release().await
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.renewal_task.abort();
    }
}
