//! Staleness decisions
//!
//! A target may be skipped only when its declared outputs all exist, nothing
//! it depends on was executed in the current plan, and (when a state store is
//! available) its action has not changed since the last recorded build.
//! A target with neither prerequisites nor outputs has nothing to compare
//! against and always runs.

use crate::runner::{RecordedState, StateStore, Target};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Why a target has to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// Phony targets always run
    Phony,
    /// Targets with neither prerequisites nor outputs always run
    NoOutputs,
    /// A prerequisite was executed earlier in this plan
    PrerequisiteExecuted(String),
    /// A declared output pattern matched nothing
    MissingOutput(String),
    /// The action differs from the one recorded at the last build
    ActionChanged,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Phony => write!(f, "phony target"),
            StaleReason::NoOutputs => write!(f, "no declared outputs"),
            StaleReason::PrerequisiteExecuted(name) => write!(f, "prerequisite '{}' was rebuilt", name),
            StaleReason::MissingOutput(pattern) => write!(f, "output '{}' is missing", pattern),
            StaleReason::ActionChanged => write!(f, "action changed since last build"),
        }
    }
}

/// Result of a staleness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    Stale(StaleReason),
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Staleness::Stale(_))
    }
}

/// Decides whether a target's action may be skipped
#[derive(Clone)]
pub struct StalenessOracle {
    project_dir: PathBuf,
    store: Option<Arc<dyn StateStore>>,
}

impl StalenessOracle {
    /// Create an oracle resolving output patterns against `project_dir`
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        StalenessOracle {
            project_dir: project_dir.into(),
            store: None,
        }
    }

    /// Consult a state store for recorded builds
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Check a target given the prerequisites that executed in this plan
    pub fn check<'a, I>(&self, target: &Target, executed_prerequisites: I) -> Staleness
    where
        I: IntoIterator<Item = &'a str>,
    {
        if target.phony {
            return Staleness::Stale(StaleReason::Phony);
        }

        if target.outputs.is_empty() && target.prerequisites.is_empty() {
            return Staleness::Stale(StaleReason::NoOutputs);
        }

        if let Some(name) = executed_prerequisites.into_iter().next() {
            return Staleness::Stale(StaleReason::PrerequisiteExecuted(name.to_string()));
        }

        if let Some(pattern) = target.outputs.iter().find(|p| !self.output_exists(p)) {
            return Staleness::Stale(StaleReason::MissingOutput(pattern.clone()));
        }

        if let Some(store) = &self.store {
            if let Some(recorded) = store.get_last_known_state(&target.name) {
                if recorded != RecordedState::of(target) {
                    return Staleness::Stale(StaleReason::ActionChanged);
                }
            }
        }

        Staleness::Fresh
    }

    /// Record a successful build; phony targets are never cached
    pub fn record(&self, target: &Target) {
        if target.phony {
            return;
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.record_state(&target.name, RecordedState::of(target)) {
                tracing::warn!(name = %target.name, error = %e, "failed to record build state");
            }
        }
    }

    /// Whether an output pattern matches at least one existing path
    fn output_exists(&self, pattern: &str) -> bool {
        let full = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            // The project directory is literal, only the declared pattern is a glob
            let base = glob::Pattern::escape(&self.project_dir.to_string_lossy());
            Path::new(&base).join(pattern).to_string_lossy().into_owned()
        };

        match glob::glob(&full) {
            Ok(mut paths) => paths.any(|entry| entry.is_ok()),
            Err(e) => {
                tracing::debug!(pattern, error = %e, "invalid output pattern");
                false
            }
        }
    }
}

impl fmt::Debug for StalenessOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StalenessOracle")
            .field("project_dir", &self.project_dir)
            .field("store", &self.store.is_some())
            .finish()
    }
}
