//! Controller runner - builds the CertificateSigningRequest controller future
//!
//! Construction is kept out of `main` so the process wiring stays readable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use kube::runtime::controller::{self, Action, Config as ControllerConfig};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::Controller;
use kube::{Api, Client};
use kubeca_common::Error;
use kubeca_controller::{error_policy, reconcile, Context};
use tokio_util::sync::CancellationToken;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the CSR controller future
///
/// The future completes after SIGTERM or Ctrl-C once in-flight reconciles
/// have drained.
pub fn build_csr_controller(
    client: Client,
    ctx: Arc<Context>,
    concurrency: u16,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let csrs: Api<CertificateSigningRequest> = Api::all(client);

    tracing::info!(concurrency, "- CertificateSigningRequest controller");

    Box::pin(
        Controller::new(csrs, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .with_config(ControllerConfig::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result),
    )
}

/// Cancel `token` on SIGTERM or Ctrl-C
///
/// Reconciles observe the token before signing and before publishing.
pub async fn cancel_on_signal(token: CancellationToken) {
    wait_for_signal().await;
    tracing::info!("Shutdown signal received");
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

type ReconcileResult = Result<
    (ObjectRef<CertificateSigningRequest>, Action),
    controller::Error<Error, watcher::Error>,
>;

/// Failed reconciles are already logged by `error_policy`; only dispatch
/// problems are surfaced here.
fn log_reconcile_result(result: ReconcileResult) -> std::future::Ready<()> {
    match result {
        Ok((obj, action)) => {
            tracing::debug!(csr = %obj.name, ?action, "reconciliation completed")
        }
        Err(controller::Error::ReconcilerFailed(e, obj)) => {
            tracing::debug!(csr = %obj.name, error = %e, "reconciliation failed")
        }
        Err(e) => tracing::warn!(error = %e, "CertificateSigningRequest controller error"),
    }
    std::future::ready(())
}

