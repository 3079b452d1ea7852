//! Runtime target representation
//!
//! This differs from config::Target by carrying a resolved action, typed
//! timeouts and paths instead of the raw YAML values.

use crate::config;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Interpreter used for string actions when the config does not name one
pub const DEFAULT_INTERPRETER: &[&str] = &["sh", "-c"];

/// A named unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Unique identifier
    pub name: String,

    /// Usage description
    pub usage: Option<String>,

    /// Hidden from help and completions
    pub private: bool,

    /// Prerequisite identifiers, in declaration order
    pub prerequisites: Vec<String>,

    /// The external command to run
    pub action: Action,

    /// Always stale, never cached
    pub phony: bool,

    /// Declared output patterns, relative to the project directory
    pub outputs: Vec<String>,

    /// Per-target timeout, overrides the engine default
    pub timeout: Option<Duration>,

    /// Working directory, relative to the project directory
    pub dir: Option<PathBuf>,
}

impl Target {
    /// Create a target with no prerequisites and no outputs
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Target {
            name: name.into(),
            usage: None,
            private: false,
            prerequisites: Vec::new(),
            action,
            phony: false,
            outputs: Vec::new(),
            timeout: None,
            dir: None,
        }
    }

    /// Create a target from its configuration
    pub fn from_config(name: String, config: config::Target, interpreter: &[String]) -> Self {
        let action = match config.run {
            config::Action::Shell(line) => Action::shell(interpreter, line),
            config::Action::Exec(argv) => Action::from_argv(argv),
        };

        Target {
            name,
            usage: config.usage,
            private: config.private,
            prerequisites: config.deps,
            action,
            phony: config.phony,
            outputs: config.outputs,
            timeout: config.timeout.map(Duration::from_secs),
            dir: config.dir.map(PathBuf::from),
        }
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Mark the target as phony
    pub fn phony(mut self) -> Self {
        self.phony = true;
        self
    }
}

/// One external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Program to execute
    pub program: String,

    /// Arguments passed to the program
    pub args: Vec<String>,
}

impl Action {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Hand a command line to an interpreter such as `sh -c`
    pub fn shell(interpreter: &[String], line: impl Into<String>) -> Self {
        let (program, flags) = match interpreter.split_first() {
            Some((program, flags)) => (program.clone(), flags.to_vec()),
            None => (
                DEFAULT_INTERPRETER[0].to_string(),
                DEFAULT_INTERPRETER[1..].iter().map(|s| s.to_string()).collect(),
            ),
        };

        let mut args = flags;
        args.push(line.into());
        Action { program, args }
    }

    /// Build from an argument vector whose first element is the program
    pub fn from_argv(argv: Vec<String>) -> Self {
        let mut argv = argv.into_iter();
        let program = argv.next().unwrap_or_default();
        Action {
            program,
            args: argv.collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.program.trim().is_empty()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_action_uses_interpreter() {
        let interpreter = vec!["bash".to_string(), "-c".to_string()];
        let action = Action::shell(&interpreter, "cargo build --release");
        assert_eq!(action.program, "bash");
        assert_eq!(action.args, vec!["-c", "cargo build --release"]);
    }

    #[test]
    fn test_shell_action_default_interpreter() {
        let action = Action::shell(&[], "echo hi");
        assert_eq!(action.program, "sh");
        assert_eq!(action.args, vec!["-c", "echo hi"]);
    }

    #[test]
    fn test_from_argv() {
        let action = Action::from_argv(vec!["cargo".into(), "test".into()]);
        assert_eq!(action, Action::new("cargo", ["test"]));
        assert!(Action::from_argv(Vec::new()).is_empty());
    }

    #[test]
    fn test_display_quotes_arguments_with_spaces() {
        let action = Action::new("sh", ["-c", "echo hi"]);
        assert_eq!(action.to_string(), "sh -c \"echo hi\"");
    }

    #[test]
    fn test_from_config() {
        let config = config::Target {
            usage: Some("Run tests".to_string()),
            private: false,
            deps: vec!["build".to_string()],
            run: config::Action::Shell("cargo test".to_string()),
            phony: true,
            outputs: vec![],
            timeout: Some(5),
            dir: None,
        };

        let target = Target::from_config("test".to_string(), config, &[]);
        assert_eq!(target.prerequisites, vec!["build"]);
        assert_eq!(target.action, Action::new("sh", ["-c", "cargo test"]));
        assert_eq!(target.timeout, Some(Duration::from_secs(5)));
        assert!(target.phony);
    }
}
