//! kubeca operator: process wiring for the CSR signing controller

#![deny(missing_docs)]

/// Command line and derived runtime configuration
pub mod config;
/// Controller construction and result logging
pub mod controller_runner;
/// Startup utilities (authority loading)
pub mod startup;

pub use config::{Cli, OperatorConfig};
