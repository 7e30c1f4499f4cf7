//! CertificateSigningRequest controller implementation
//!
//! Each attempt re-reads the request, runs the eligibility guard chain,
//! resolves the signer, signs, and publishes the result. Any step may fail;
//! the next attempt starts from fresh state, so a publish that landed is seen
//! as "already signed" rather than signed twice.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use kubeca_authority::{IssuerDirectory, SignRequest};
use kubeca_common::events::{reasons, SIGNED_NOTE};
use kubeca_common::metrics::{OtelSigningMetrics, ReconcileResult, SignTimer, SigningMetrics};
use kubeca_common::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::{BackoffConfig, ObjectBackoff};
use crate::client::{CsrClient, KubeCsrClient};
use crate::eligibility::{evaluate, ApprovalPolicy, Decision, SkipReason};
use crate::publisher::published_certificate;
use crate::resolver::{resolve_signer, Unresolved};

/// Immutable reconciler settings, built once from the command line
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// How requests without an approval decision are treated
    pub approval: ApprovalPolicy,
    /// Budget for one attempt, checked before signing and before publishing
    pub reconcile_timeout: Duration,
    /// Requeue backoff for failed attempts
    pub backoff: BackoffConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            approval: ApprovalPolicy::default(),
            reconcile_timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }
}

/// What one attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The request no longer exists
    NotFound,
    /// The guard chain skipped the request
    Ineligible(SkipReason),
    /// The signer name did not resolve to an issuer
    Unresolved(Unresolved),
    /// A certificate was issued and published
    Signed {
        /// Issuer label
        issuer: String,
        /// Profile name
        profile: String,
    },
}

impl Outcome {
    fn result(&self) -> ReconcileResult {
        match self {
            Self::NotFound => ReconcileResult::NotFound,
            Self::Ineligible(_) | Self::Unresolved(_) => ReconcileResult::Skipped,
            Self::Signed { .. } => ReconcileResult::Signed,
        }
    }
}

/// Controller context shared by every reconcile
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```text
/// let ctx = Context::builder(csr_client, authority)
///     .config(reconciler_config)
///     .shutdown(token)
///     .build();
/// ```
pub struct Context {
    /// Store access (trait object for testability)
    pub csr: Arc<dyn CsrClient>,
    /// Profile to issuer lookup
    pub directory: Arc<dyn IssuerDirectory>,
    /// Signing telemetry sink
    pub metrics: Arc<dyn SigningMetrics>,
    /// Reconciler settings
    pub config: ReconcilerConfig,
    /// Cancelled on process shutdown
    pub shutdown: CancellationToken,
    backoff: ObjectBackoff,
}

impl Context {
    /// Create a builder from a store client and an issuer directory
    pub fn builder(
        csr: Arc<dyn CsrClient>,
        directory: Arc<dyn IssuerDirectory>,
    ) -> ContextBuilder {
        ContextBuilder::new(csr, directory)
    }

    /// Context backed by the real API server
    pub fn for_cluster(client: Client, directory: Arc<dyn IssuerDirectory>) -> ContextBuilder {
        ContextBuilder::new(Arc::new(KubeCsrClient::new(client)), directory)
    }

    /// Consecutive failures recorded for `name`
    pub fn failed_attempts(&self, name: &str) -> u32 {
        self.backoff.attempts(name)
    }

    fn ensure_live(&self, name: &str, deadline: Instant, stage: &str) -> Result<(), Error> {
        if self.shutdown.is_cancelled() {
            debug!(csr = %name, stage, "shutdown requested");
            return Err(Error::cancelled(name, stage));
        }
        if Instant::now() >= deadline {
            warn!(csr = %name, stage, "reconcile deadline exceeded");
            return Err(Error::cancelled(name, stage));
        }
        Ok(())
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    csr: Arc<dyn CsrClient>,
    directory: Arc<dyn IssuerDirectory>,
    metrics: Option<Arc<dyn SigningMetrics>>,
    config: ReconcilerConfig,
    shutdown: Option<CancellationToken>,
}

impl ContextBuilder {
    fn new(csr: Arc<dyn CsrClient>, directory: Arc<dyn IssuerDirectory>) -> Self {
        Self {
            csr,
            directory,
            metrics: None,
            config: ReconcilerConfig::default(),
            shutdown: None,
        }
    }

    /// Override the metrics sink (primarily for testing)
    pub fn metrics(mut self, metrics: Arc<dyn SigningMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set reconciler settings
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Share the process shutdown token
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            csr: self.csr,
            directory: self.directory,
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(OtelSigningMetrics)),
            backoff: ObjectBackoff::new(self.config.backoff.clone()),
            config: self.config,
            shutdown: self.shutdown.unwrap_or_default(),
        }
    }
}

/// Reconcile a CertificateSigningRequest
///
/// The watched object only supplies the name; state is re-read from the API
/// server. Signed and skipped requests wait for the next change.
#[instrument(skip(csr, ctx), fields(csr = %csr.name_any()))]
pub async fn reconcile(
    csr: Arc<CertificateSigningRequest>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let name = csr.name_any();
    match reconcile_by_name(&name, &ctx).await {
        Ok(outcome) => {
            ctx.backoff.reset(&name);
            ctx.metrics.record_reconcile(outcome.result());
            Ok(Action::await_change())
        }
        Err(e) => {
            ctx.metrics.record_reconcile(ReconcileResult::Error);
            Err(e)
        }
    }
}

/// Run one attempt for the named request
pub async fn reconcile_by_name(name: &str, ctx: &Context) -> Result<Outcome, Error> {
    let deadline = Instant::now() + ctx.config.reconcile_timeout;

    let Some(snapshot) = ctx.csr.fetch(name).await? else {
        debug!(csr = %name, "certificate signing request not found");
        return Ok(Outcome::NotFound);
    };

    if let Decision::Skip(reason) = evaluate(&snapshot, ctx.config.approval) {
        if reason.is_routine() {
            debug!(csr = %name, %reason, "skipping");
        } else {
            info!(csr = %name, %reason, "skipping");
        }
        return Ok(Outcome::Ineligible(reason));
    }

    let signer_name = snapshot.spec.signer_name.as_str();
    let signer = match resolve_signer(ctx.directory.as_ref(), signer_name) {
        Ok(signer) => signer,
        Err(unresolved) => {
            info!(csr = %name, signer = %signer_name, reason = %unresolved, "no issuer for signer, skipping");
            return Ok(Outcome::Unresolved(unresolved));
        }
    };
    let issuer_label = signer.issuer.label().to_string();
    let profile = signer.profile.clone();

    ctx.ensure_live(name, deadline, "signing")?;

    let request = SignRequest {
        request: snapshot.spec.request.0.clone(),
        profile: profile.clone(),
    };
    let timer = SignTimer::start();
    let signed = signer.issuer.sign(&request).await;
    let elapsed = timer.elapsed();

    let signed = signed.map_err(|e| {
        warn!(
            csr = %name,
            issuer = %issuer_label,
            profile = %profile,
            error = %e,
            "signing failed"
        );
        Error::signing(&issuer_label, &profile, e.to_string())
    })?;

    info!(
        csr = %name,
        issuer = %issuer_label,
        profile = %profile,
        subject = %signed.certificate.subject,
        serial = %signed.certificate.serial,
        not_after = signed.certificate.not_after,
        dns_names = ?signed.certificate.dns_names,
        elapsed_ms = elapsed.as_millis() as u64,
        "certificate issued"
    );

    ctx.ensure_live(name, deadline, "publishing")?;

    let certificate = published_certificate(&signed.pem, signer.issuer.chain_pem());
    ctx.csr
        .patch_status(&snapshot, certificate.as_bytes())
        .await?;

    ctx.csr
        .emit_event(&snapshot, reasons::SIGNED, SIGNED_NOTE)
        .await;
    ctx.metrics
        .record_sign_duration(&issuer_label, &profile, elapsed);

    info!(csr = %name, issuer = %issuer_label, profile = %profile, "certificate published");
    Ok(Outcome::Signed {
        issuer: issuer_label,
        profile,
    })
}

/// Error policy for the CertificateSigningRequest controller
///
/// Every failure is requeued with per-object exponential backoff. Errors that
/// need an operator wait the maximum delay. A 404 means the request is gone;
/// its failure count is dropped and nothing is requeued.
pub fn error_policy(
    csr: Arc<CertificateSigningRequest>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    let name = error
        .request_name()
        .map(str::to_string)
        .unwrap_or_else(|| csr.name_any());

    if let Error::Kube {
        source: kube::Error::Api(ae),
    } = error
    {
        if ae.code == 404 {
            debug!(csr = %name, "request deleted while failing, dropping backoff");
            ctx.backoff.reset(&name);
            return Action::await_change();
        }
    }

    let delay = if error.is_retryable() {
        ctx.backoff.next_delay(&name)
    } else {
        ctx.backoff.config().max_delay
    };

    match error {
        Error::PublishConflict { .. } | Error::Cancelled { .. } => warn!(
            csr = %name,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "reconcile interrupted, requeueing"
        ),
        _ => error!(
            csr = %name,
            error = %error,
            attempts = ctx.failed_attempts(&name),
            delay_ms = delay.as_millis() as u64,
            "reconciliation failed"
        ),
    }

    Action::requeue(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockCsrClient;
    use async_trait::async_trait;
    use k8s_openapi::api::certificates::v1::{
        CertificateSigningRequestCondition, CertificateSigningRequestSpec,
        CertificateSigningRequestStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;
    use kubeca_authority::{
        Authority, AuthorityError, CertificateSummary, Issuer, SignResult,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Issuer returning a canned leaf and counting calls
    struct CannedIssuer {
        label: &'static str,
        chain: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl CannedIssuer {
        fn new(label: &'static str) -> Self {
            Self {
                label,
                chain: "",
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Issuer for CannedIssuer {
        fn label(&self) -> &str {
            self.label
        }

        fn chain_pem(&self) -> &str {
            self.chain
        }

        async fn sign(&self, request: &SignRequest) -> Result<SignResult, AuthorityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AuthorityError::Signing("hsm unavailable".to_string()));
            }
            Ok(SignResult {
                certificate: CertificateSummary {
                    subject: "CN=web".to_string(),
                    serial: "01".to_string(),
                    not_before: 0,
                    not_after: 3600,
                    dns_names: vec![],
                },
                pem: format!("LEAF-{}\n", request.profile),
            })
        }
    }

    /// Captured metric samples
    #[derive(Default)]
    struct MetricsCapture {
        samples: Mutex<Vec<(String, String)>>,
        results: Mutex<Vec<ReconcileResult>>,
    }

    impl SigningMetrics for MetricsCapture {
        fn record_sign_duration(&self, issuer: &str, profile: &str, _elapsed: Duration) {
            self.samples
                .lock()
                .unwrap()
                .push((issuer.to_string(), profile.to_string()));
        }

        fn record_reconcile(&self, result: ReconcileResult) {
            self.results.lock().unwrap().push(result);
        }
    }

    impl MetricsCapture {
        fn samples(&self) -> Vec<(String, String)> {
            self.samples.lock().unwrap().clone()
        }

        fn results(&self) -> Vec<ReconcileResult> {
            self.results.lock().unwrap().clone()
        }
    }

    fn sample_csr(name: &str, signer: &str, conditions: &[&str]) -> CertificateSigningRequest {
        CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                resource_version: Some("7".to_string()),
                ..Default::default()
            },
            spec: CertificateSigningRequestSpec {
                signer_name: signer.to_string(),
                request: ByteString(b"CSR".to_vec()),
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

    struct Fixture {
        ctx: Arc<Context>,
        issuer: Arc<CannedIssuer>,
        metrics: Arc<MetricsCapture>,
    }

    fn fixture(mock: MockCsrClient, issuer: CannedIssuer, config: ReconcilerConfig) -> Fixture {
        let issuer = Arc::new(issuer);
        let directory = Authority::builder()
            .issuer(issuer.clone())
            .issuer(Arc::new(CannedIssuer::new("ca-b")))
            .profile("web", "root-ca")
            .build()
            .expect("valid directory");
        let metrics = Arc::new(MetricsCapture::default());
        let ctx = Context::builder(Arc::new(mock), Arc::new(directory))
            .metrics(metrics.clone())
            .config(config)
            .build();
        Fixture {
            ctx: Arc::new(ctx),
            issuer,
            metrics,
        }
    }

    fn returning(csr: CertificateSigningRequest) -> MockCsrClient {
        let mut mock = MockCsrClient::new();
        mock.expect_fetch()
            .returning(move |_| Ok(Some(csr.clone())));
        mock
    }

    // ==========================================================================
    // Story Tests: Signing Flow
    // ==========================================================================

    /// Story: An approved request is signed, published once, audited and timed
    #[tokio::test]
    async fn story_approved_request_signed_and_published() {
        let published = Arc::new(Mutex::new(Vec::<(String, Vec<u8>)>::new()));
        let published_clone = published.clone();

        let mut mock = returning(sample_csr("csr-1", "root-ca/web", &["Approved"]));
        mock.expect_patch_status()
            .times(1)
            .returning(move |snapshot, cert| {
                published_clone.lock().unwrap().push((
                    snapshot.metadata.resource_version.clone().unwrap_or_default(),
                    cert.to_vec(),
                ));
                Ok(())
            });
        mock.expect_emit_event()
            .withf(|_, reason, _| reason.to_string() == reasons::SIGNED)
            .times(1)
            .returning(|_, _, _| ());

        let mut issuer = CannedIssuer::new("root-ca");
        issuer.chain = "\nCHAIN\n";
        let f = fixture(mock, issuer, ReconcilerConfig::default());

        let action = reconcile(
            Arc::new(sample_csr("csr-1", "root-ca/web", &["Approved"])),
            f.ctx.clone(),
        )
        .await
        .expect("reconcile succeeds");

        assert_eq!(action, Action::await_change());
        assert_eq!(f.issuer.calls(), 1);
        let published = published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "7");
        assert_eq!(published[0].1, b"LEAF-web\nCHAIN".to_vec());
        assert_eq!(
            f.metrics.samples(),
            vec![("root-ca".to_string(), "web".to_string())]
        );
        assert_eq!(f.metrics.results(), vec![ReconcileResult::Signed]);
    }

    /// Story: A vanished request is a quiet no-op
    #[tokio::test]
    async fn story_missing_request_is_not_an_error() {
        let mut mock = MockCsrClient::new();
        mock.expect_fetch().returning(|_| Ok(None));
        mock.expect_patch_status().never();
        mock.expect_emit_event().never();
        let f = fixture(mock, CannedIssuer::new("root-ca"), ReconcilerConfig::default());

        let outcome = reconcile_by_name("gone", &f.ctx).await.expect("no error");
        assert_eq!(outcome, Outcome::NotFound);
        assert_eq!(f.issuer.calls(), 0);
    }

    /// Story: Skipped requests never reach the authority
    #[tokio::test]
    async fn story_guards_short_circuit_before_signing() {
        let mut already_signed = sample_csr("signed", "root-ca/web", &[]);
        if let Some(status) = already_signed.status.as_mut() {
            status.certificate = Some(ByteString(b"EXISTING".to_vec()));
        }
        let cases = [
            (
                sample_csr("denied", "root-ca/web", &["Denied"]),
                Outcome::Ineligible(SkipReason::Denied),
            ),
            (
                sample_csr("nosigner", "", &[]),
                Outcome::Ineligible(SkipReason::MissingSignerName),
            ),
            (already_signed, Outcome::Ineligible(SkipReason::AlreadySigned)),
            (
                sample_csr("spoofed", "ca-b/web", &[]),
                Outcome::Unresolved(Unresolved::LabelMismatch {
                    claimed: "ca-b".to_string(),
                    actual: "root-ca".to_string(),
                }),
            ),
            (
                sample_csr("malformed", "root-ca", &[]),
                Outcome::Unresolved(Unresolved::Malformed { tokens: 1 }),
            ),
        ];

        for (csr, expected) in cases {
            let name = csr.name_any();
            let mut mock = returning(csr);
            mock.expect_patch_status().never();
            mock.expect_emit_event().never();
            let f = fixture(mock, CannedIssuer::new("root-ca"), ReconcilerConfig::default());

            let outcome = reconcile_by_name(&name, &f.ctx).await.expect("no error");
            assert_eq!(outcome, expected, "case {}", name);
            assert_eq!(f.issuer.calls(), 0, "case {}", name);
            assert!(f.metrics.samples().is_empty());
        }
    }

    /// Story: A failing authority leaves the request untouched and retries
    #[tokio::test]
    async fn story_signing_failure_mutates_nothing() {
        let mut mock = returning(sample_csr("csr-1", "root-ca/web", &[]));
        mock.expect_patch_status().never();
        mock.expect_emit_event().never();
        let mut issuer = CannedIssuer::new("root-ca");
        issuer.fail = true;
        let f = fixture(mock, issuer, ReconcilerConfig::default());

        let err = reconcile(
            Arc::new(sample_csr("csr-1", "root-ca/web", &[])),
            f.ctx.clone(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Signing { .. }));
        assert!(err.is_retryable());
        assert!(f.metrics.samples().is_empty());
        assert_eq!(f.metrics.results(), vec![ReconcileResult::Error]);
    }

    /// Story: A stale publish is a conflict with no event and no sample
    #[tokio::test]
    async fn story_publish_conflict_emits_nothing() {
        let mut mock = returning(sample_csr("csr-1", "root-ca/web", &[]));
        mock.expect_patch_status()
            .times(1)
            .returning(|snapshot, _| Err(Error::publish_conflict(snapshot.name_any())));
        mock.expect_emit_event().never();
        let f = fixture(mock, CannedIssuer::new("root-ca"), ReconcilerConfig::default());

        let err = reconcile_by_name("csr-1", &f.ctx).await.unwrap_err();
        assert!(matches!(err, Error::PublishConflict { ref name } if name == "csr-1"));
        assert!(f.metrics.samples().is_empty());
    }

    /// Story: Shutdown before signing aborts without touching the authority
    #[tokio::test]
    async fn story_shutdown_cancels_before_signing() {
        let mut mock = returning(sample_csr("csr-1", "root-ca/web", &[]));
        mock.expect_patch_status().never();
        mock.expect_emit_event().never();
        let f = fixture(mock, CannedIssuer::new("root-ca"), ReconcilerConfig::default());
        f.ctx.shutdown.cancel();

        let err = reconcile_by_name("csr-1", &f.ctx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { ref stage, .. } if stage == "signing"));
        assert_eq!(f.issuer.calls(), 0);
    }

    /// Story: An exhausted deadline aborts the attempt
    #[tokio::test]
    async fn story_deadline_cancels_attempt() {
        let mut mock = returning(sample_csr("csr-1", "root-ca/web", &[]));
        mock.expect_patch_status().never();
        let config = ReconcilerConfig {
            reconcile_timeout: Duration::ZERO,
            ..Default::default()
        };
        let f = fixture(mock, CannedIssuer::new("root-ca"), config);

        let err = reconcile_by_name("csr-1", &f.ctx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(err.is_retryable());
    }

    /// Story: Strict approval skips requests nobody approved
    #[tokio::test]
    async fn story_explicit_policy_skips_unapproved() {
        let mut mock = returning(sample_csr("csr-1", "root-ca/web", &[]));
        mock.expect_patch_status().never();
        let config = ReconcilerConfig {
            approval: ApprovalPolicy::RequireExplicit,
            ..Default::default()
        };
        let f = fixture(mock, CannedIssuer::new("root-ca"), config);

        let outcome = reconcile_by_name("csr-1", &f.ctx).await.expect("no error");
        assert_eq!(outcome, Outcome::Ineligible(SkipReason::NotApproved));
    }

    /// Story: Repeated failures back off per object, success resets
    #[tokio::test]
    async fn story_error_policy_backs_off_and_resets() {
        let mock = returning(sample_csr("csr-1", "root-ca/web", &["Denied"]));
        let config = ReconcilerConfig {
            backoff: BackoffConfig {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(8),
                backoff_multiplier: 2.0,
            },
            ..Default::default()
        };
        let f = fixture(mock, CannedIssuer::new("root-ca"), config);
        let csr = Arc::new(sample_csr("csr-1", "root-ca/web", &["Denied"]));

        let err = Error::signing("root-ca", "web", "boom");
        error_policy(csr.clone(), &err, f.ctx.clone());
        error_policy(csr.clone(), &err, f.ctx.clone());
        assert_eq!(f.ctx.failed_attempts("csr-1"), 2);

        // A successful (skipping) reconcile clears the counter
        reconcile(csr.clone(), f.ctx.clone())
            .await
            .expect("reconcile succeeds");
        assert_eq!(f.ctx.failed_attempts("csr-1"), 0);
    }

    /// Story: A request deleted mid-failure leaves no backoff state behind
    #[tokio::test]
    async fn story_not_found_drops_backoff() {
        let mock = MockCsrClient::new();
        let f = fixture(mock, CannedIssuer::new("root-ca"), ReconcilerConfig::default());
        let csr = Arc::new(sample_csr("csr-1", "root-ca/web", &[]));

        error_policy(csr.clone(), &Error::signing("root-ca", "web", "boom"), f.ctx.clone());
        assert_eq!(f.ctx.failed_attempts("csr-1"), 1);

        let gone = Error::from(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "certificatesigningrequests \"csr-1\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        }));
        let action = error_policy(csr, &gone, f.ctx.clone());
        assert_eq!(action, Action::await_change());
        assert_eq!(f.ctx.failed_attempts("csr-1"), 0);
    }

    #[tokio::test]
    async fn non_retryable_errors_wait_max_delay() {
        let mock = MockCsrClient::new();
        let f = fixture(mock, CannedIssuer::new("root-ca"), ReconcilerConfig::default());
        let csr = Arc::new(sample_csr("csr-1", "root-ca/web", &[]));

        let err = Error::startup("unreachable in practice");
        let action = error_policy(csr, &err, f.ctx.clone());
        assert_eq!(
            action,
            Action::requeue(BackoffConfig::default().max_delay)
        );
        assert_eq!(f.ctx.failed_attempts("csr-1"), 0);
    }
}
