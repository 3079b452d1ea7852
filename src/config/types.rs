//! Core configuration types
//!
//! This module defines the data structures that represent an rmake.yml configuration file.

use serde::{Deserialize, Serialize};

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application name (optional)
    #[serde(default)]
    pub name: Option<String>,

    /// Application usage description (optional)
    #[serde(default)]
    pub usage: Option<String>,

    /// Explicit default target; falls back to the first declared target
    #[serde(default)]
    pub default: Option<String>,

    /// Global interpreter used for string actions (e.g., ["sh", "-c"])
    #[serde(default)]
    pub interpreter: Option<Vec<String>>,

    /// Dotenv file whose variables are passed to every action
    #[serde(default, rename = "env_file", alias = "env-file")]
    pub env_file: Option<String>,

    /// Targets in declaration order
    #[serde(default, deserialize_with = "deserialize_targets")]
    pub targets: Vec<(String, Target)>,
}

impl Config {
    /// Look up a declared target by name
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets
            .iter()
            .find(|(target_name, _)| target_name == name)
            .map(|(_, target)| target)
    }
}

/// A target definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Target {
    /// Usage description for help text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,

    /// Whether this target is hidden from help and completions
    #[serde(default)]
    pub private: bool,

    /// Prerequisite targets, run before this one
    #[serde(
        default,
        alias = "needs",
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_string_list"
    )]
    pub deps: Vec<String>,

    /// Action to execute
    pub run: Action,

    /// Phony targets have no filesystem output and always run
    #[serde(default)]
    pub phony: bool,

    /// Output paths (glob patterns) produced by the action
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_string_list"
    )]
    pub outputs: Vec<String>,

    /// Timeout in seconds for the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Working directory, relative to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// An action - either a shell line or an explicit argument vector
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Action {
    /// Command line handed to the interpreter
    Shell(String),

    /// Program followed by its arguments, executed directly
    Exec(Vec<String>),
}

/// Custom deserializer for targets that keeps declaration order
fn deserialize_targets<'de, D>(deserializer: D) -> Result<Vec<(String, Target)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::Mapping(map) => {
            let mut targets = Vec::with_capacity(map.len());
            for (key, item) in map {
                let name = match key {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return Err(D::Error::custom("target names must be strings")),
                };
                let target = Target::deserialize(item)
                    .map_err(|e| D::Error::custom(format!("target '{}': {}", name, e)))?;
                targets.push((name, target));
            }
            Ok(targets)
        }
        // Null or not present
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("targets must be a mapping")),
    }
}

/// Custom deserializer for lists that also accepts a single string
fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::String(s) => Ok(vec![s]),
        Value::Sequence(seq) => {
            let mut items = Vec::with_capacity(seq.len());
            for item in seq {
                let s = String::deserialize(item).map_err(D::Error::custom)?;
                items.push(s);
            }
            Ok(items)
        }
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("expected a string or a list of strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_simple_config() {
        let yaml = r#"
targets:
  build:
    usage: Build the project
    run: cargo build
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.targets.len(), 1);
        assert!(config.target("build").is_some());
    }

    #[test]
    fn test_targets_keep_declaration_order() {
        let yaml = r#"
targets:
  zeta:
    run: "true"
  alpha:
    run: "true"
  mid:
    run: "true"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<&str> = config.targets.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_deserialize_exec_action_and_deps() {
        let yaml = r#"
targets:
  test:
    needs: build
    run: [cargo, test, --all]
    outputs: target/report.xml
    timeout: 30
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let test = config.target("test").unwrap();
        assert_eq!(test.deps, vec!["build"]);
        assert_eq!(test.outputs, vec!["target/report.xml"]);
        assert_eq!(test.timeout, Some(30));
        match &test.run {
            Action::Exec(argv) => assert_eq!(argv, &vec!["cargo", "test", "--all"]),
            other => panic!("expected exec action, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_run_is_rejected() {
        let yaml = r#"
targets:
  broken:
    usage: no action here
"#;
        let result: std::result::Result<Config, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }
}
