//! Dependency resolution
//!
//! Expands a requested target into an execution plan: every target reachable
//! through prerequisites, each exactly once, prerequisites first.

use crate::error::{ConfigError, ConfigResult};
use crate::runner::{Registry, Target};
use std::collections::HashMap;

/// A target scheduled in a plan, with the plan positions of its prerequisites
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub target: Target,
    pub prerequisites: Vec<usize>,
}

/// Topologically ordered targets for one invocation
#[derive(Debug, Clone)]
pub struct Plan {
    root: String,
    nodes: Vec<PlanNode>,
    positions: HashMap<String, usize>,
}

impl Plan {
    /// The requested target
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &PlanNode {
        &self.nodes[index]
    }

    /// Position of a target within the plan
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.target.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Resolve `root` against the registry into an execution plan
pub fn resolve(registry: &Registry, root: &str) -> ConfigResult<Plan> {
    let mut resolver = Resolver {
        registry,
        marks: HashMap::new(),
        stack: Vec::new(),
        order: Vec::new(),
    };

    let target = registry.lookup(root)?;
    resolver.visit(target)?;

    let positions: HashMap<String, usize> = resolver
        .order
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.clone(), i))
        .collect();

    let nodes = resolver
        .order
        .into_iter()
        .map(|target| {
            let mut prerequisites: Vec<usize> = Vec::with_capacity(target.prerequisites.len());
            for name in &target.prerequisites {
                let position = positions[name];
                if !prerequisites.contains(&position) {
                    prerequisites.push(position);
                }
            }
            PlanNode {
                target: target.clone(),
                prerequisites,
            }
        })
        .collect();

    Ok(Plan {
        root: root.to_string(),
        nodes,
        positions,
    })
}

struct Resolver<'a> {
    registry: &'a Registry,
    marks: HashMap<&'a str, Mark>,
    stack: Vec<&'a str>,
    order: Vec<&'a Target>,
}

impl<'a> Resolver<'a> {
    /// Post-order depth-first visit
    fn visit(&mut self, target: &'a Target) -> ConfigResult<()> {
        match self.marks.get(target.name.as_str()) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(self.cycle_error(&target.name)),
            None => {}
        }

        self.marks.insert(&target.name, Mark::Visiting);
        self.stack.push(&target.name);

        for name in &target.prerequisites {
            let prerequisite = self.registry.lookup(name).map_err(|_| {
                ConfigError::UnknownTarget {
                    name: name.clone(),
                    referenced_by: Some(target.name.clone()),
                }
            })?;
            self.visit(prerequisite)?;
        }

        self.stack.pop();
        self.marks.insert(&target.name, Mark::Done);
        self.order.push(target);
        Ok(())
    }

    /// Build the cycle path from the first occurrence of `name` on the stack
    fn cycle_error(&self, name: &str) -> ConfigError {
        let start = self.stack.iter().position(|n| *n == name).unwrap_or(0);
        let mut path: Vec<String> = self.stack[start..].iter().map(|n| n.to_string()).collect();
        path.push(name.to_string());
        ConfigError::Cycle { path }
    }
}
