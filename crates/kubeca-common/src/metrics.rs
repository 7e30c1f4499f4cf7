//! Metrics registry for kubeca observability
//!
//! Provides OpenTelemetry metrics for:
//! - Signing latency per issuer and profile
//! - Reconcile outcomes (signed, skipped, failed)

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for kubeca metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("kubeca"));

/// Histogram of authority signing duration
///
/// Measured around the authority call only; publishing is excluded.
///
/// Labels:
/// - `issuer`: issuer label
/// - `profile`: profile name
pub static SIGN_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("kubeca_sign_duration_seconds")
        .with_description("Duration of CA sign requests in seconds")
        .with_unit("s")
        .build()
});

/// Counter of reconcile attempts by outcome
///
/// Labels:
/// - `result`: signed, skipped, not_found, error
pub static RECONCILE_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("kubeca_reconcile_total")
        .with_description("Total number of CertificateSigningRequest reconciles by outcome")
        .with_unit("{reconciles}")
        .build()
});

/// Reconcile outcome label values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileResult {
    /// A certificate was issued and published
    Signed,
    /// The request was ineligible or unresolved
    Skipped,
    /// The request no longer exists
    NotFound,
    /// The attempt failed and will be retried
    Error,
}

impl ReconcileResult {
    /// Label value for this outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signed => "signed",
            Self::Skipped => "skipped",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }
}

/// Sink for signing telemetry.
///
/// The reconciler records through this trait so tests can capture samples
/// without an OTEL pipeline.
pub trait SigningMetrics: Send + Sync {
    /// Record one signing latency sample
    fn record_sign_duration(&self, issuer: &str, profile: &str, elapsed: Duration);

    /// Record one reconcile outcome
    fn record_reconcile(&self, result: ReconcileResult);
}

/// Production implementation backed by the global OTEL meter.
#[derive(Debug, Default, Clone, Copy)]
pub struct OtelSigningMetrics;

impl SigningMetrics for OtelSigningMetrics {
    fn record_sign_duration(&self, issuer: &str, profile: &str, elapsed: Duration) {
        SIGN_DURATION.record(
            elapsed.as_secs_f64(),
            &[
                KeyValue::new("issuer", issuer.to_string()),
                KeyValue::new("profile", profile.to_string()),
            ],
        );
    }

    fn record_reconcile(&self, result: ReconcileResult) {
        RECONCILE_TOTAL.add(1, &[KeyValue::new("result", result.as_str())]);
    }
}

/// Times a single authority call
pub struct SignTimer {
    start: Instant,
}

impl SignTimer {
    /// Start timing immediately before invoking the authority
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
