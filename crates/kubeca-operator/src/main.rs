//! kubeca - Kubernetes CertificateSigningRequest signer

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use kubeca_common::leader_election::{LeaderElector, LeaderGuard};
use kubeca_common::telemetry::init_telemetry;
use kubeca_common::{Error, VERSION};
use kubeca_controller::Context;
use kubeca_operator::config::{LeaderElectionConfig, OperatorConfig};
use kubeca_operator::controller_runner::{build_csr_controller, cancel_on_signal};
use kubeca_operator::startup::load_authority;
use kubeca_operator::Cli;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider for the kube client's TLS stack
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let telemetry = init_telemetry(config.telemetry.clone())?;
    install_panic_hook();

    info!(
        version = VERSION,
        otlp = telemetry.exporting(),
        "Starting kubeca"
    );

    let result = run(config).await;
    if let Err(e) = &result {
        error!(error = %e, context = ?e.context(), "kubeca terminated");
    }
    telemetry.shutdown();

    if result.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(config: OperatorConfig) -> Result<(), Error> {
    let authority = Arc::new(load_authority(&config.ca_config)?);

    let client = Client::try_default().await.map_err(|e| {
        Error::startup_with_context("kubernetes", format!("failed to create client: {}", e))
    })?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let mut guard = match &config.leader_election {
        Some(le) => {
            tokio::select! {
                guard = acquire_leadership(client.clone(), le) => Some(guard?),
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested before leadership was acquired");
                    return Ok(());
                }
            }
        }
        None => None,
    };

    let ctx = Arc::new(
        Context::for_cluster(client.clone(), authority)
            .config(config.reconciler.clone())
            .shutdown(shutdown.clone())
            .build(),
    );
    let controller = build_csr_controller(client, ctx, config.concurrency);

    info!("kubeca controller running");
    let leadership_lost = {
        let lost = async {
            match guard.as_mut() {
                Some(guard) => guard.lost().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = controller => false,
            _ = lost => true,
        }
    };

    if leadership_lost {
        shutdown.cancel();
        return Err(Error::internal_with_context(
            "leader-election",
            "leadership lost, exiting so another replica can take over",
        ));
    }

    if let Some(guard) = guard {
        if let Err(e) = guard.release_leadership().await {
            warn!(error = %e, "Failed to release leader lease");
        }
    }

    info!("kubeca stopped");
    Ok(())
}

async fn acquire_leadership(
    client: Client,
    config: &LeaderElectionConfig,
) -> Result<LeaderGuard, Error> {
    let identity = pod_identity();
    info!(
        lease = %config.lease_name,
        namespace = %config.namespace,
        identity = %identity,
        "Waiting for leadership"
    );

    let elector = Arc::new(LeaderElector::new(
        client,
        &config.lease_name,
        &config.namespace,
        &identity,
    ));
    elector
        .acquire()
        .await
        .map_err(|e| Error::startup_with_context("leader-election", e.to_string()))
}

/// Downward-API pod name, else the container hostname
fn pod_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("kubeca-{}", std::process::id()))
}

/// Log panics with a backtrace and exit non-zero
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        error!(panic = %info, backtrace = %backtrace, "kubeca panicked");
        std::process::exit(1);
    }));
}
