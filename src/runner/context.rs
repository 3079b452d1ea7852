//! Options for one invocation
//!
//! Tracks the knobs a caller can set for a run: concurrency, failure policy,
//! dry-run, timeouts and how chatty the console should be.

use std::time::Duration;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

/// Options controlling a single dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Maximum number of actions running at once (at least 1)
    pub concurrency: usize,

    /// Stop scheduling new targets after the first failure
    pub fail_fast: bool,

    /// Compute and print the plan without running anything
    pub dry_run: bool,

    /// Timeout for actions that do not set their own
    pub timeout: Option<Duration>,

    /// Verbosity level
    pub verbosity: Verbosity,
}

impl RunOptions {
    /// Create options with default settings: sequential, fail-fast
    pub fn new() -> Self {
        RunOptions {
            concurrency: 1,
            fail_fast: true,
            dry_run: false,
            timeout: None,
            verbosity: Verbosity::Normal,
        }
    }

    /// Set the concurrency limit; zero is treated as one
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}
