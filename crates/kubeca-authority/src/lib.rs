//! Signing authority boundary for kubeca
//!
//! The controller resolves a profile to an [`Issuer`] through an
//! [`IssuerDirectory`] and asks it to sign. Everything cryptographic stays on
//! this side of the boundary.

#![deny(missing_docs)]

pub mod authority;
pub mod certificate;
pub mod config;
pub mod error;
pub mod issuer;

pub use authority::{Authority, AuthorityBuilder, IssuerDirectory};
pub use certificate::CertificateSummary;
pub use config::AuthorityConfig;
pub use error::AuthorityError;
pub use issuer::{Issuer, Profile, SignRequest, SignResult, SoftwareIssuer};
