//! Rmake - a YAML-based target runner
//!
//! Rmake reads targets from an `rmake.yml` file, resolves their
//! prerequisites into an execution plan and runs the stale ones on a
//! bounded pool of workers.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod ui;

// Re-export commonly used types
pub use error::{Result, RmakeError};

/// Current version of Rmake
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
