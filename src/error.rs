//! Error types for rmake

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Process exit code for a fully successful run
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit code when the requested target (or a prerequisite) is not declared
pub const EXIT_UNKNOWN_TARGET: i32 = 1;
/// Process exit code when the dependency graph contains a cycle
pub const EXIT_CYCLE: i32 = 2;
/// Process exit code when one or more actions failed
pub const EXIT_ACTION_FAILED: i32 = 3;
/// Process exit code for configuration and usage errors
pub const EXIT_CONFIG: i32 = 4;

/// Result type alias for rmake operations
pub type Result<T> = std::result::Result<T, RmakeError>;

/// Main error type for rmake
#[derive(Error, Debug)]
pub enum RmakeError {
    /// Configuration and graph errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Action execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Build-state store errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RmakeError {
    /// Map the error to the process exit code reported by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            RmakeError::Config(e) => e.exit_code(),
            RmakeError::Execution(_) => EXIT_ACTION_FAILED,
            _ => EXIT_CONFIG,
        }
    }
}

/// Configuration, registry and graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Target '{0}' is declared more than once")]
    DuplicateTarget(String),

    #[error("{}", unknown_target_message(.name, .referenced_by.as_deref()))]
    UnknownTarget {
        name: String,
        referenced_by: Option<String>,
    },

    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("No targets are declared")]
    NoTargets,

    #[error("Failed to load env file '{path}': {error}")]
    EnvFile { path: PathBuf, error: String },
}

impl ConfigError {
    /// Map the error to the process exit code reported by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::UnknownTarget { .. } => EXIT_UNKNOWN_TARGET,
            ConfigError::Cycle { .. } => EXIT_CYCLE,
            _ => EXIT_CONFIG,
        }
    }
}

fn unknown_target_message(name: &str, referenced_by: Option<&str>) -> String {
    match referenced_by {
        Some(parent) => format!("Target '{}' (required by '{}') is not defined", name, parent),
        None => format!("Target '{}' is not defined", name),
    }
}

/// Action execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Command failed with exit code {exit_code:?}")]
    ActionFailed {
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Command timed out after {after:?}")]
    Timeout { after: Duration, output: String },

    #[error("Failed to start '{program}': {error}")]
    Spawn { program: String, error: String },
}

impl ExecutionError {
    /// Output captured from the action before it failed, if any
    pub fn output(&self) -> &str {
        match self {
            ExecutionError::ActionFailed { output, .. } | ExecutionError::Timeout { output, .. } => {
                output
            }
            ExecutionError::Spawn { .. } => "",
        }
    }

    /// Exit code of the failed process, if it exited on its own
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionError::ActionFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Timeout { .. })
    }
}

/// Build-state store errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read state file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to write state file '{path}': {error}")]
    Write { path: PathBuf, error: String },

    #[error("Malformed state file '{path}': {error}")]
    Format { path: PathBuf, error: String },
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for state store operations
pub type StateResult<T> = std::result::Result<T, StateError>;
