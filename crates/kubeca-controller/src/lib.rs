//! CertificateSigningRequest reconciler for kubeca
//!
//! Decides which requests to sign, resolves their issuer and profile, and
//! publishes the issued certificate back to the API server.

#![deny(missing_docs)]

pub mod backoff;
pub mod client;
pub mod controller;
pub mod eligibility;
pub mod publisher;
pub mod resolver;

pub use client::{CsrClient, KubeCsrClient};
pub use controller::{
    error_policy, reconcile, reconcile_by_name, Context, ContextBuilder, Outcome,
    ReconcilerConfig,
};
pub use eligibility::{ApprovalPolicy, Decision, SkipReason};
pub use kubeca_common::{Error, Result};
pub use resolver::{resolve_signer, ResolvedSigner, Unresolved};
