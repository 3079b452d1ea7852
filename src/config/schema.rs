//! Configuration validation
//!
//! This module checks a parsed configuration and turns it into a target
//! registry. Prerequisite references and cycles are left to the resolver so
//! that one broken target does not make the others unusable.

use crate::config::types::{Action, Config, Target};
use crate::error::{ConfigError, ConfigResult};
use crate::runner::{self, Registry};

/// Validate a complete configuration
pub fn validate_config(config: &Config) -> ConfigResult<()> {
    if let Some(interpreter) = &config.interpreter {
        if interpreter.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "interpreter must name a program".to_string(),
            ));
        }
    }

    for (name, target) in &config.targets {
        validate_target(name, target)?;
    }

    Ok(())
}

/// Validate a single target
pub fn validate_target(name: &str, target: &Target) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::Invalid("target names cannot be empty".to_string()));
    }

    let empty_action = match &target.run {
        Action::Shell(line) => line.trim().is_empty(),
        Action::Exec(argv) => argv.first().map_or(true, |p| p.trim().is_empty()),
    };
    if empty_action {
        return Err(ConfigError::Invalid(format!(
            "target '{}' has an empty action",
            name
        )));
    }

    if target.phony && !target.outputs.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "phony target '{}' cannot declare outputs",
            name
        )));
    }

    for pattern in &target.outputs {
        glob::Pattern::new(pattern).map_err(|e| {
            ConfigError::Invalid(format!(
                "target '{}' has an invalid output pattern '{}': {}",
                name, pattern, e
            ))
        })?;
    }

    if target.timeout == Some(0) {
        return Err(ConfigError::Invalid(format!(
            "target '{}' timeout must be at least one second",
            name
        )));
    }

    Ok(())
}

/// Validate a configuration and build the target registry from it
pub fn build_registry(config: &Config) -> ConfigResult<Registry> {
    validate_config(config)?;

    let interpreter = config.interpreter.clone().unwrap_or_default();
    let mut registry = Registry::new();

    for (name, target) in &config.targets {
        registry.register(runner::Target::from_config(
            name.clone(),
            target.clone(),
            &interpreter,
        ))?;
    }

    if let Some(default) = &config.default {
        if !registry.contains(default) {
            return Err(ConfigError::Invalid(format!(
                "default target '{}' is not defined",
                default
            )));
        }
        registry.set_default(default.clone());
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(run: Action) -> Target {
        Target {
            usage: None,
            private: false,
            deps: vec![],
            run,
            phony: false,
            outputs: vec![],
            timeout: None,
            dir: None,
        }
    }

    fn config(targets: Vec<(&str, Target)>) -> Config {
        Config {
            name: None,
            usage: None,
            default: None,
            interpreter: None,
            env_file: None,
            targets: targets
                .into_iter()
                .map(|(name, target)| (name.to_string(), target))
                .collect(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        let config = config(vec![("build", target(Action::Shell("cargo build".to_string())))]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_empty_action() {
        let blank = config(vec![("build", target(Action::Shell("  ".to_string())))]);
        assert!(matches!(validate_config(&blank), Err(ConfigError::Invalid(_))));

        let no_program = config(vec![("build", target(Action::Exec(vec![])))]);
        assert!(matches!(validate_config(&no_program), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_phony_with_outputs() {
        let mut clean = target(Action::Shell("rm -rf out".to_string()));
        clean.phony = true;
        clean.outputs = vec!["out".to_string()];

        let result = validate_config(&config(vec![("clean", clean)]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_invalid_output_pattern() {
        let mut codegen = target(Action::Shell("codegen".to_string()));
        codegen.outputs = vec!["out/[".to_string()];

        let result = validate_config(&config(vec![("codegen", codegen)]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut slow = target(Action::Shell("sleep 1".to_string()));
        slow.timeout = Some(0);

        let result = validate_config(&config(vec![("slow", slow)]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_build_registry_uses_interpreter() {
        let mut config = config(vec![("build", target(Action::Shell("make".to_string())))]);
        config.interpreter = Some(vec!["bash".to_string(), "-ec".to_string()]);

        let registry = build_registry(&config).unwrap();
        let build = registry.lookup("build").unwrap();
        assert_eq!(build.action, runner::Action::new("bash", ["-ec", "make"]));
    }

    #[test]
    fn test_build_registry_rejects_duplicates() {
        let config = config(vec![
            ("build", target(Action::Shell("make".to_string()))),
            ("build", target(Action::Shell("make all".to_string()))),
        ]);

        let result = build_registry(&config);
        assert!(matches!(result, Err(ConfigError::DuplicateTarget(ref name)) if name == "build"));
    }

    #[test]
    fn test_build_registry_explicit_default() {
        let mut config = config(vec![
            ("build", target(Action::Shell("make".to_string()))),
            ("test", target(Action::Shell("make test".to_string()))),
        ]);
        config.default = Some("test".to_string());

        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.default_target().unwrap().name, "test");
    }

    #[test]
    fn test_build_registry_unknown_default() {
        let mut config = config(vec![("build", target(Action::Shell("make".to_string())))]);
        config.default = Some("release".to_string());

        assert!(matches!(build_registry(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_prerequisite_is_left_to_resolver() {
        let mut build = target(Action::Shell("make".to_string()));
        build.deps = vec!["codegen".to_string()];
        let config = config(vec![("build", build), ("lint", target(Action::Shell("lint".to_string())))]);

        let registry = build_registry(&config).unwrap();
        assert!(runner::resolve(&registry, "lint").is_ok());
        assert!(matches!(
            runner::resolve(&registry, "build"),
            Err(ConfigError::UnknownTarget { .. })
        ));
    }
}
