//! Build-state persistence
//!
//! The staleness oracle consults a [`StateStore`] to learn what a target
//! looked like the last time it was built. Two stores are provided: an
//! in-memory one and a YAML file kept next to the configuration.

use crate::error::{StateError, StateResult};
use crate::runner::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Directory, relative to the project, holding the state file
pub const STATE_DIR: &str = ".rmake";

/// State file name inside [`STATE_DIR`]
pub const STATE_FILE: &str = "state.yml";

/// What was recorded after a target's last successful build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedState {
    /// The action line that produced the outputs
    pub action: String,
}

impl RecordedState {
    /// Capture the current state of a target
    pub fn of(target: &Target) -> Self {
        RecordedState {
            action: target.action.to_string(),
        }
    }
}

/// Persistence interface for recorded target states
pub trait StateStore: Send + Sync {
    /// The state recorded for a target, if any
    fn get_last_known_state(&self, target: &str) -> Option<RecordedState>;

    /// Record the state of a target after a successful build
    fn record_state(&self, target: &str, state: RecordedState) -> StateResult<()>;
}

/// Store that lives only for the current process
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<BTreeMap<String, RecordedState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryStateStore {
    fn get_last_known_state(&self, target: &str) -> Option<RecordedState> {
        self.states.lock().ok()?.get(target).cloned()
    }

    fn record_state(&self, target: &str, state: RecordedState) -> StateResult<()> {
        let mut states = self.states.lock().map_err(|_| StateError::Write {
            path: PathBuf::from("<memory>"),
            error: "state lock poisoned".to_string(),
        })?;
        states.insert(target.to_string(), state);
        Ok(())
    }
}

/// Store backed by a YAML file, rewritten on every record
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    states: Mutex<BTreeMap<String, RecordedState>>,
}

impl FileStateStore {
    /// Open the store at `<project_dir>/.rmake/state.yml`
    pub fn open_in(project_dir: &Path) -> StateResult<Self> {
        Self::open(project_dir.join(STATE_DIR).join(STATE_FILE))
    }

    /// Open the store at a specific path; a missing file is an empty store
    pub fn open(path: PathBuf) -> StateResult<Self> {
        let states = if path.is_file() {
            let contents = fs::read_to_string(&path).map_err(|e| StateError::Read {
                path: path.clone(),
                error: e.to_string(),
            })?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml::from_str(&contents).map_err(|e| StateError::Format {
                    path: path.clone(),
                    error: e.to_string(),
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), entries = states.len(), "opened state store");

        Ok(FileStateStore {
            path,
            states: Mutex::new(states),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, states: &BTreeMap<String, RecordedState>) -> StateResult<()> {
        let to_error = |e: String| StateError::Write {
            path: self.path.clone(),
            error: e,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| to_error(e.to_string()))?;
        }
        let contents = serde_yaml::to_string(states).map_err(|e| to_error(e.to_string()))?;
        fs::write(&self.path, contents).map_err(|e| to_error(e.to_string()))
    }
}

impl StateStore for FileStateStore {
    fn get_last_known_state(&self, target: &str) -> Option<RecordedState> {
        self.states.lock().ok()?.get(target).cloned()
    }

    fn record_state(&self, target: &str, state: RecordedState) -> StateResult<()> {
        let mut states = self.states.lock().map_err(|_| StateError::Write {
            path: self.path.clone(),
            error: "state lock poisoned".to_string(),
        })?;
        states.insert(target.to_string(), state);
        self.persist(&states)
    }
}
