//! Command line flags and the immutable configuration derived from them

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use kubeca_common::leader_election::DEFAULT_LEASE_NAME;
use kubeca_common::telemetry::TelemetryConfig;
use kubeca_common::Error;
use kubeca_controller::{ApprovalPolicy, ReconcilerConfig};

/// Default location of the authority configuration file
pub const DEFAULT_CA_CONFIG: &str = "/kubeca/etc/ca-config.yaml";

/// kubeca - signs Kubernetes CertificateSigningRequests with a configured CA
#[derive(Parser, Debug, Clone)]
#[command(name = "kubeca", version, about, long_about = None)]
pub struct Cli {
    /// Path to the authority configuration (issuers and profiles)
    #[arg(long = "ca-cfg", env = "KUBECA_CA_CONFIG", default_value = DEFAULT_CA_CONFIG)]
    pub ca_config: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Hold a Lease before reconciling so only one replica signs
    #[arg(long)]
    pub enable_leader_election: bool,

    /// Name of the leader election Lease
    #[arg(long, default_value = DEFAULT_LEASE_NAME)]
    pub leader_election_id: String,

    /// Namespace of the leader election Lease
    #[arg(long, env = "POD_NAMESPACE")]
    pub leader_election_namespace: Option<String>,

    /// Upper bound on requests reconciled at once
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_concurrent_reconciles: u16,

    /// Budget for one reconcile attempt, in seconds
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub reconcile_timeout_secs: u64,

    /// Only sign requests carrying an Approved condition
    #[arg(long)]
    pub require_explicit_approval: bool,
}

/// Lease settings used when leader election is enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderElectionConfig {
    /// Lease name
    pub lease_name: String,
    /// Lease namespace
    pub namespace: String,
}

/// Runtime configuration, built once at startup and passed down
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Authority configuration file
    pub ca_config: PathBuf,
    /// Logging and OTLP export
    pub telemetry: TelemetryConfig,
    /// None when leader election is disabled
    pub leader_election: Option<LeaderElectionConfig>,
    /// Controller concurrency
    pub concurrency: u16,
    /// Per-attempt reconciler settings
    pub reconciler: ReconcilerConfig,
}

impl Cli {
    /// Validate flag combinations and derive the runtime configuration
    pub fn into_config(self) -> Result<OperatorConfig, Error> {
        let leader_election = if self.enable_leader_election {
            let namespace = self
                .leader_election_namespace
                .filter(|ns| !ns.is_empty())
                .ok_or_else(|| {
                    Error::startup_with_context(
                        "leader-election",
                        "--leader-election-namespace or POD_NAMESPACE is required",
                    )
                })?;
            Some(LeaderElectionConfig {
                lease_name: self.leader_election_id,
                namespace,
            })
        } else {
            None
        };

        let approval = if self.require_explicit_approval {
            ApprovalPolicy::RequireExplicit
        } else {
            ApprovalPolicy::Implicit
        };

        Ok(OperatorConfig {
            ca_config: self.ca_config,
            telemetry: TelemetryConfig {
                json_logs: self.json_logs,
                debug: self.debug,
                ..Default::default()
            },
            leader_election,
            concurrency: self.max_concurrent_reconciles,
            reconciler: ReconcilerConfig {
                approval,
                reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
                ..Default::default()
            },
        })
    }
}
