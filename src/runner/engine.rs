//! Plan execution engine
//!
//! The engine repeatedly starts the earliest node of a [`Plan`] whose
//! prerequisites have all settled, as read from their completion signals, and
//! gives it a worker permit. A node still waiting on a running prerequisite
//! does not hold back independent nodes queued after it.
//! Workers consult the staleness oracle, run the action through the injected
//! executor and publish the node's terminal state on its own signal.
//!
//! With fail-fast enabled the first failure halts scheduling: nothing new is
//! started, in-flight workers finish and their results are kept but marked
//! discarded, and never-started nodes stay `Pending`.

use crate::error::ExecutionError;
use crate::runner::{
    ActionExecutor, ActionOutput, Plan, RunOptions, StaleReason, Staleness, StalenessOracle, Target,
};
use crate::ui::Console;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info_span, Instrument};

/// Lifecycle of a target within one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// Not yet considered
    Pending,
    /// Waiting on the staleness decision
    Resolving,
    /// Up to date, action not run
    Skipped,
    /// Action is executing
    Running,
    /// Action exited successfully
    Succeeded,
    /// Action failed, timed out or could not start
    Failed,
    /// A prerequisite failed, so the target was never started
    Blocked,
}

impl TargetState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TargetState::Skipped | TargetState::Succeeded | TargetState::Failed | TargetState::Blocked
        )
    }

    /// Terminal and not a failure
    pub fn is_ok(&self) -> bool {
        matches!(self, TargetState::Skipped | TargetState::Succeeded)
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetState::Pending => "pending",
            TargetState::Resolving => "resolving",
            TargetState::Skipped => "skipped",
            TargetState::Running => "running",
            TargetState::Succeeded => "succeeded",
            TargetState::Failed => "failed",
            TargetState::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

/// What happened to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Up to date, action skipped
    Skipped,
    /// Action ran and exited successfully
    Succeeded(ActionOutput),
    /// Action failed
    Failed(ExecutionError),
    /// Not started because a prerequisite failed
    Blocked { prerequisite: String },
}

impl Outcome {
    pub fn state(&self) -> TargetState {
        match self {
            Outcome::Skipped => TargetState::Skipped,
            Outcome::Succeeded(_) => TargetState::Succeeded,
            Outcome::Failed(_) => TargetState::Failed,
            Outcome::Blocked { .. } => TargetState::Blocked,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.state().is_ok()
    }

    /// Whether the action was actually invoked
    pub fn executed(&self) -> bool {
        matches!(self, Outcome::Succeeded(_) | Outcome::Failed(_))
    }
}

/// Per-target result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub target: String,
    pub outcome: Outcome,
    /// Why the action had to run; `None` when it was skipped or blocked
    pub reason: Option<StaleReason>,
    pub duration: Duration,
    /// Finished after a fail-fast halt triggered by another target
    pub discarded: bool,
}

/// Aggregated outcome of running a plan
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Results of visited targets, in plan order
    pub results: Vec<RunResult>,
    /// Final state of every planned target, in plan order
    pub states: Vec<(String, TargetState)>,
    /// Scheduling stopped early because of a failure
    pub halted: bool,
    /// Every planned target succeeded or was skipped
    pub success: bool,
    pub duration: Duration,
}

impl RunReport {
    pub fn result(&self, target: &str) -> Option<&RunResult> {
        self.results.iter().find(|r| r.target == target)
    }

    pub fn state(&self, target: &str) -> Option<TargetState> {
        self.states
            .iter()
            .find(|(name, _)| name == target)
            .map(|(_, state)| *state)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
    }

    /// Names of targets whose action was invoked, in plan order
    pub fn executed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.outcome.executed())
            .map(|r| r.target.as_str())
            .collect()
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.outcome == Outcome::Skipped)
            .map(|r| r.target.as_str())
            .collect()
    }

    /// Targets that never left `Pending`
    pub fn not_started(&self) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, state)| *state == TargetState::Pending)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Runs execution plans
pub struct Engine {
    executor: Arc<dyn ActionExecutor>,
    oracle: StalenessOracle,
    console: Console,
    concurrency: usize,
    fail_fast: bool,
    default_timeout: Option<Duration>,
}

impl Engine {
    /// Create a sequential, fail-fast engine
    pub fn new(executor: Arc<dyn ActionExecutor>, oracle: StalenessOracle) -> Self {
        let defaults = RunOptions::new();
        Engine {
            executor,
            oracle,
            console: Console::silent(),
            concurrency: defaults.concurrency,
            fail_fast: defaults.fail_fast,
            default_timeout: defaults.timeout,
        }
    }

    /// Apply concurrency, failure policy and timeout from run options
    pub fn with_options(mut self, options: &RunOptions) -> Self {
        self.concurrency = options.concurrency.max(1);
        self.fail_fast = options.fail_fast;
        self.default_timeout = options.timeout;
        self
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Execute a plan and collect the results
    pub async fn run(&self, plan: &Plan) -> RunReport {
        let span = info_span!("run_plan", root = %plan.root(), targets = plan.len());
        self.run_inner(plan).instrument(span).await
    }

    async fn run_inner(&self, plan: &Plan) -> RunReport {
        let started = Instant::now();
        let count = plan.len();

        let mut senders = Vec::with_capacity(count);
        let mut receivers = Vec::with_capacity(count);
        for _ in 0..count {
            let (tx, rx) = watch::channel(TargetState::Pending);
            senders.push(Some(tx));
            receivers.push(rx);
        }

        let results: Arc<Mutex<Vec<Option<RunResult>>>> = Arc::new(Mutex::new(vec![None; count]));
        let halted = Arc::new(AtomicBool::new(false));
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(count);

        debug!(concurrency = self.concurrency, fail_fast = self.fail_fast, "starting plan");

        // Workers report their index here once their node has settled
        let (finished_tx, mut finished_rx) = mpsc::unbounded_channel::<usize>();
        let mut waiting: Vec<usize> = (0..count).collect();

        while !waiting.is_empty() {
            if self.is_halted(&halted) {
                break;
            }

            // Earliest node in plan order whose prerequisites have all settled
            let ready = waiting.iter().position(|&index| {
                plan.node(index)
                    .prerequisites
                    .iter()
                    .all(|&p| settled(&receivers[p]).is_some())
            });
            let Some(position) = ready else {
                if finished_rx.recv().await.is_none() {
                    break;
                }
                continue;
            };
            let index = waiting.remove(position);
            let node = plan.node(index);

            let mut executed = Vec::new();
            let mut failed_prerequisite = None;
            for &prerequisite in &node.prerequisites {
                let name = &plan.node(prerequisite).target.name;
                match settled(&receivers[prerequisite]) {
                    Some(TargetState::Succeeded) => executed.push(name.clone()),
                    Some(TargetState::Skipped) => {}
                    _ => {
                        failed_prerequisite.get_or_insert_with(|| name.clone());
                    }
                }
            }

            let Some(sender) = senders[index].take() else {
                continue;
            };

            if let Some(prerequisite) = failed_prerequisite {
                self.console.target_blocked(&node.target.name, &prerequisite);
                store_result(
                    &results,
                    index,
                    RunResult {
                        target: node.target.name.clone(),
                        outcome: Outcome::Blocked { prerequisite },
                        reason: None,
                        duration: Duration::ZERO,
                        discarded: false,
                    },
                );
                sender.send_replace(TargetState::Blocked);
                continue;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            if self.is_halted(&halted) {
                break;
            }

            sender.send_replace(TargetState::Resolving);

            let worker = Worker {
                index,
                target: node.target.clone(),
                executed,
                executor: Arc::clone(&self.executor),
                oracle: self.oracle.clone(),
                console: self.console,
                results: Arc::clone(&results),
                halted: Arc::clone(&halted),
                fail_fast: self.fail_fast,
                timeout: node.target.timeout.or(self.default_timeout),
            };

            let finished = Finished {
                index,
                tx: finished_tx.clone(),
            };
            let span = info_span!("target", name = %node.target.name);
            handles.push(tokio::spawn(
                async move {
                    let _permit = permit;
                    let _finished = finished;
                    worker.run(sender).await;
                }
                .instrument(span),
            ));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "target worker panicked");
            }
        }

        let states: Vec<(String, TargetState)> = plan
            .nodes()
            .iter()
            .zip(&receivers)
            .map(|(node, rx)| (node.target.name.clone(), *rx.borrow()))
            .collect();

        let results: Vec<RunResult> = results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .flatten()
            .collect();

        let success = states.iter().all(|(_, state)| state.is_ok());
        let report = RunReport {
            results,
            states,
            halted: halted.load(Ordering::SeqCst),
            success,
            duration: started.elapsed(),
        };

        debug!(
            success = report.success,
            halted = report.halted,
            executed = report.executed().len(),
            "plan finished"
        );

        report
    }

    fn is_halted(&self, halted: &AtomicBool) -> bool {
        self.fail_fast && halted.load(Ordering::SeqCst)
    }
}

/// One node's unit of work
struct Worker {
    index: usize,
    target: Target,
    executed: Vec<String>,
    executor: Arc<dyn ActionExecutor>,
    oracle: StalenessOracle,
    console: Console,
    results: Arc<Mutex<Vec<Option<RunResult>>>>,
    halted: Arc<AtomicBool>,
    fail_fast: bool,
    timeout: Option<Duration>,
}

impl Worker {
    async fn run(self, signal: watch::Sender<TargetState>) {
        let started = Instant::now();
        let staleness = self
            .oracle
            .check(&self.target, self.executed.iter().map(String::as_str));

        let (outcome, reason) = match staleness {
            Staleness::Fresh => {
                debug!("up to date");
                self.console.target_skipped(&self.target.name);
                (Outcome::Skipped, None)
            }
            Staleness::Stale(reason) => {
                debug!(reason = %reason, "running action");
                signal.send_replace(TargetState::Running);
                self.console.target_started(&self.target, &reason);

                let result = self
                    .executor
                    .execute(&self.target.action, self.target.dir.as_deref(), self.timeout)
                    .await;

                match result {
                    Ok(output) => {
                        self.oracle.record(&self.target);
                        self.console.target_succeeded(&self.target.name, &output);
                        (Outcome::Succeeded(output), Some(reason))
                    }
                    Err(e) => {
                        debug!(error = %e, "action failed");
                        self.console.target_failed(&self.target.name, &e);
                        (Outcome::Failed(e), Some(reason))
                    }
                }
            }
        };

        let discarded = if self.fail_fast {
            if matches!(outcome, Outcome::Failed(_)) {
                self.halted.swap(true, Ordering::SeqCst)
            } else {
                self.halted.load(Ordering::SeqCst)
            }
        } else {
            false
        };

        let state = outcome.state();
        store_result(
            &self.results,
            self.index,
            RunResult {
                target: self.target.name.clone(),
                outcome,
                reason,
                duration: started.elapsed(),
                discarded,
            },
        );

        // Results are stored before the signal so dependents see them finalized.
        signal.send_replace(state);
    }
}

/// Wakes the scheduler when a worker ends, including by panic
struct Finished {
    index: usize,
    tx: mpsc::UnboundedSender<usize>,
}

impl Drop for Finished {
    fn drop(&mut self) {
        let _ = self.tx.send(self.index);
    }
}

/// Terminal state of a node, `None` while it is still pending or running
fn settled(signal: &watch::Receiver<TargetState>) -> Option<TargetState> {
    let state = *signal.borrow();
    if state.is_terminal() {
        Some(state)
    } else if signal.has_changed().is_err() {
        // The worker went away without publishing a terminal state
        Some(TargetState::Failed)
    } else {
        None
    }
}

fn store_result(results: &Mutex<Vec<Option<RunResult>>>, index: usize, result: RunResult) {
    let mut slots = results.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    slots[index] = Some(result);
}
