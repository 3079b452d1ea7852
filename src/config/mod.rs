//! Configuration parsing and validation
//!
//! This module handles parsing of rmake.yml configuration files
//! and turning them into a validated target registry.

pub mod parse;
pub mod schema;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use types::*;
