//! Common types for kubeca: errors, events, metrics, telemetry and leader election

#![deny(missing_docs)]

pub mod error;
pub mod events;
pub mod leader_election;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Controller name reported on Events and used as the field manager
pub const CONTROLLER_NAME: &str = "kubeca";

/// Field manager for status patches issued by the controller
pub const FIELD_MANAGER: &str = "kubeca";

/// Crate version reported at startup and on telemetry resources
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
