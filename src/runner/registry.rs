//! Target registry
//!
//! Holds the declared targets in declaration order together with the
//! default target used when no target is requested.

use crate::error::{ConfigError, ConfigResult};
use crate::runner::Target;
use std::collections::HashMap;

/// The set of declared targets
#[derive(Debug, Clone, Default)]
pub struct Registry {
    targets: Vec<Target>,
    index: HashMap<String, usize>,
    default: Option<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target, rejecting duplicate identifiers
    pub fn register(&mut self, target: Target) -> ConfigResult<()> {
        if self.index.contains_key(&target.name) {
            return Err(ConfigError::DuplicateTarget(target.name));
        }

        self.index.insert(target.name.clone(), self.targets.len());
        self.targets.push(target);
        Ok(())
    }

    /// Find a target by identifier
    pub fn lookup(&self, name: &str) -> ConfigResult<&Target> {
        self.index
            .get(name)
            .map(|&i| &self.targets[i])
            .ok_or_else(|| ConfigError::UnknownTarget {
                name: name.to_string(),
                referenced_by: None,
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Set the explicit default target
    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default = Some(name.into());
    }

    /// Name of the explicit default, if one was set
    pub fn explicit_default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// The target run when none is requested: the explicit default, else the first declared
    pub fn default_target(&self) -> ConfigResult<&Target> {
        match &self.default {
            Some(name) => self.lookup(name),
            None => self.targets.first().ok_or(ConfigError::NoTargets),
        }
    }

    /// Targets in declaration order
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
