//! Console output
//!
//! Progress lines go to stderr and action output to stdout, both gated by
//! the verbosity level.

use crate::error::ExecutionError;
use crate::runner::{
    ActionOutput, Outcome, Plan, Registry, RunReport, StaleReason, Target, Verbosity,
};
use colored::Colorize;

/// Verbosity-aware printer for run progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Console {
    verbosity: Verbosity,
}

impl Console {
    pub fn new(verbosity: Verbosity) -> Self {
        Console { verbosity }
    }

    /// A console that prints nothing
    pub fn silent() -> Self {
        Console::new(Verbosity::Silent)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        if self.enabled(Verbosity::Quiet) {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
    }

    pub fn target_started(&self, target: &Target, reason: &StaleReason) {
        if self.enabled(Verbosity::Normal) {
            eprintln!("{} {}", "==>".blue().bold(), target.name.bold());
            eprintln!("    {}", target.action.to_string().dimmed());
        }
        if self.enabled(Verbosity::Verbose) {
            eprintln!("    {}", format!("({})", reason).dimmed());
        }
    }

    pub fn target_skipped(&self, name: &str) {
        if self.enabled(Verbosity::Normal) {
            eprintln!("{} {} {}", "---".dimmed(), name, "(up to date)".dimmed());
        }
    }

    pub fn target_succeeded(&self, name: &str, output: &ActionOutput) {
        if self.enabled(Verbosity::Quiet) && !output.output.is_empty() {
            print!("{}", output.output);
            if !output.output.ends_with('\n') {
                println!();
            }
        }
        if self.enabled(Verbosity::Verbose) {
            eprintln!("{} {}", "ok".green(), name);
        }
    }

    pub fn target_failed(&self, name: &str, error: &ExecutionError) {
        if !self.enabled(Verbosity::Quiet) {
            return;
        }
        let captured = error.output();
        if !captured.is_empty() {
            eprint!("{}", captured);
            if !captured.ends_with('\n') {
                eprintln!();
            }
        }
        eprintln!("{} {}: {}", "FAILED".red().bold(), name.bold(), error);
    }

    pub fn target_blocked(&self, name: &str, prerequisite: &str) {
        if self.enabled(Verbosity::Normal) {
            eprintln!(
                "{} {} {}",
                "!!!".yellow(),
                name,
                format!("(not started: '{}' failed)", prerequisite).dimmed()
            );
        }
    }

    /// Print the plan for a dry run
    pub fn plan(&self, plan: &Plan) {
        if !self.enabled(Verbosity::Quiet) {
            return;
        }
        for (i, node) in plan.nodes().iter().enumerate() {
            let mut line = format!("{:>3}. {}", i + 1, node.target.name.bold());
            if node.target.phony {
                line.push_str(&format!(" {}", "[phony]".dimmed()));
            }
            println!("{}", line);
            println!("     {}", node.target.action.to_string().dimmed());
        }
    }

    /// Print the end-of-run summary
    pub fn summary(&self, report: &RunReport) {
        if !self.enabled(Verbosity::Normal) {
            return;
        }

        let executed = report.executed().len();
        let skipped = report.skipped().len();
        let failed = report.failures().count();
        let not_started = report.not_started().len();

        if self.enabled(Verbosity::Verbose) {
            for result in &report.results {
                let note = if result.discarded { " (discarded)" } else { "" };
                let state = match &result.outcome {
                    Outcome::Failed(_) => result.outcome.state().to_string().red(),
                    Outcome::Blocked { .. } => result.outcome.state().to_string().yellow(),
                    _ => result.outcome.state().to_string().green(),
                };
                eprintln!(
                    "    {:<20} {:<10} {:>8.2?}{}",
                    result.target,
                    state,
                    result.duration,
                    note.dimmed()
                );
            }
        }

        let mut parts = vec![format!("{} run", executed), format!("{} up to date", skipped)];
        if failed > 0 {
            parts.push(format!("{} failed", failed));
        }
        if not_started > 0 {
            parts.push(format!("{} not started", not_started));
        }

        let headline = if report.success {
            "done".green().bold()
        } else {
            "failed".red().bold()
        };
        eprintln!("{} {} in {:.2?}", headline, parts.join(", "), report.duration);
    }

    /// Print the declared targets
    pub fn targets(&self, registry: &Registry) {
        let default = registry.default_target().ok().map(|t| t.name.clone());
        let width = registry
            .targets()
            .map(|t| t.name.len())
            .max()
            .unwrap_or(0);

        for target in registry.targets().filter(|t| !t.private) {
            let marker = if default.as_deref() == Some(target.name.as_str()) {
                "*".green().to_string()
            } else {
                " ".to_string()
            };
            let usage = target.usage.clone().unwrap_or_default();
            println!(
                "{} {:<width$}  {}",
                marker,
                target.name,
                usage.dimmed(),
                width = width
            );
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Console::new(Verbosity::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_console() {
        let console = Console::silent();
        assert_eq!(console.verbosity(), Verbosity::Silent);
        assert!(!console.enabled(Verbosity::Quiet));
    }

    #[test]
    fn test_verbose_enables_everything() {
        let console = Console::new(Verbosity::Verbose);
        assert!(console.enabled(Verbosity::Quiet));
        assert!(console.enabled(Verbosity::Normal));
        assert!(console.enabled(Verbosity::Verbose));
    }
}
