//! Target execution engine
//!
//! This module handles the registry of declared targets, dependency
//! resolution, staleness decisions and running actions.

pub mod context;
pub mod dispatch;
pub mod engine;
pub mod executor;
pub mod plan;
pub mod registry;
pub mod staleness;
pub mod state;
pub mod target;

// Re-export main types
pub use context::*;
pub use dispatch::*;
pub use engine::*;
pub use executor::*;
pub use plan::*;
pub use registry::*;
pub use staleness::*;
pub use state::*;
pub use target::*;
