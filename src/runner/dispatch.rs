//! Dispatcher
//!
//! Turns a requested target name into a plan, runs it and maps the outcome
//! to a process exit code.

use crate::error::{ConfigResult, EXIT_ACTION_FAILED, EXIT_SUCCESS};
use crate::runner::{
    resolve, ActionExecutor, Engine, Plan, Registry, RunOptions, RunReport, StalenessOracle,
};
use crate::ui::Console;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// What a dispatch produced
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Plan computed, nothing executed
    DryRun(Plan),
    /// Plan executed
    Completed(RunReport),
}

impl Dispatch {
    /// Exit code for a dispatch that got past resolution
    pub fn exit_code(&self) -> i32 {
        match self {
            Dispatch::DryRun(_) => EXIT_SUCCESS,
            Dispatch::Completed(report) if report.success => EXIT_SUCCESS,
            Dispatch::Completed(_) => EXIT_ACTION_FAILED,
        }
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Dispatch::Completed(report) => Some(report),
            Dispatch::DryRun(_) => None,
        }
    }
}

/// Resolves and runs requested targets against a fixed registry
pub struct Dispatcher {
    registry: Arc<Registry>,
    executor: Arc<dyn ActionExecutor>,
    oracle: StalenessOracle,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        executor: Arc<dyn ActionExecutor>,
        oracle: StalenessOracle,
    ) -> Self {
        Dispatcher {
            registry,
            executor,
            oracle,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Build the plan for a target, or for the default target when `None`
    pub fn plan(&self, target: Option<&str>) -> ConfigResult<Plan> {
        let root = match target {
            Some(name) => self.registry.lookup(name)?,
            None => self.registry.default_target()?,
        };
        resolve(&self.registry, &root.name)
    }

    /// Resolve, plan and run a target
    ///
    /// Structural errors (unknown target, cycle) are returned before any
    /// action runs. Action failures are reported in the [`Dispatch`].
    pub async fn run(&self, target: Option<&str>, options: &RunOptions) -> ConfigResult<Dispatch> {
        let plan = self.plan(target)?;
        let span = info_span!("dispatch", root = %plan.root(), dry_run = options.dry_run);

        let dispatch = async move {
            debug!(plan = ?plan.names(), "resolved plan");
            let console = Console::new(options.verbosity);

            if options.dry_run {
                console.plan(&plan);
                return Dispatch::DryRun(plan);
            }

            let engine = Engine::new(Arc::clone(&self.executor), self.oracle.clone())
                .with_options(options)
                .with_console(console);
            let report = engine.run(&plan).await;
            console.summary(&report);

            Dispatch::Completed(report)
        }
        .instrument(span)
        .await;

        Ok(dispatch)
    }
}
