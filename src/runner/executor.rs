//! Action execution
//!
//! The engine never spawns processes itself; it goes through an
//! [`ActionExecutor`] so graph and ordering logic can be exercised with a
//! scripted executor in tests.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::Action;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

/// How long to keep reading output after a timed out action was killed
const KILL_GRACE: Duration = Duration::from_millis(100);

/// Output of an action that exited successfully
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    /// Process exit code
    pub exit_code: i32,
    /// Captured stdout followed by stderr
    pub output: String,
}

/// Capability to run one external command
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Run `action`, optionally in `dir`, killing it after `limit`
    async fn execute(
        &self,
        action: &Action,
        dir: Option<&Path>,
        limit: Option<Duration>,
    ) -> ExecutionResult<ActionOutput>;
}

/// Executor that spawns real processes
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    /// Directory commands run in unless a target names its own
    working_dir: PathBuf,
    /// Extra environment passed to every command
    env: Vec<(String, String)>,
}

impl ProcessExecutor {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        ProcessExecutor {
            working_dir: working_dir.into(),
            env: Vec::new(),
        }
    }

    /// Set environment variables for every command
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[async_trait]
impl ActionExecutor for ProcessExecutor {
    async fn execute(
        &self,
        action: &Action,
        dir: Option<&Path>,
        limit: Option<Duration>,
    ) -> ExecutionResult<ActionOutput> {
        let working_dir = match dir {
            Some(dir) => self.working_dir.join(dir),
            None => self.working_dir.clone(),
        };

        let mut command = Command::new(&action.program);
        command
            .args(&action.args)
            .current_dir(&working_dir)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = %action, dir = %working_dir.display(), "spawning action");

        let spawn_error = |e: std::io::Error| ExecutionError::Spawn {
            program: action.program.clone(),
            error: e.to_string(),
        };

        let mut child = command.spawn().map_err(spawn_error)?;

        // Output is collected as it arrives so a killed action still reports it
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(tokio::spawn(drain(pipe, Arc::clone(&stdout))));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(tokio::spawn(drain(pipe, Arc::clone(&stderr))));
        }

        let status = match limit {
            Some(duration) => match timeout(duration, child.wait()).await {
                Ok(status) => status.map_err(spawn_error)?,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "failed to kill timed out action");
                    }
                    // Descendants may still hold the pipes open
                    for mut reader in readers {
                        if timeout(KILL_GRACE, &mut reader).await.is_err() {
                            reader.abort();
                        }
                    }
                    return Err(ExecutionError::Timeout {
                        after: duration,
                        output: captured(&stdout, &stderr),
                    });
                }
            },
            None => child.wait().await.map_err(spawn_error)?,
        };

        for reader in readers {
            if let Err(e) = reader.await {
                tracing::debug!(error = %e, "output reader stopped");
            }
        }
        let output = captured(&stdout, &stderr);

        if status.success() {
            Ok(ActionOutput {
                exit_code: status.code().unwrap_or(0),
                output,
            })
        } else {
            Err(ExecutionError::ActionFailed {
                exit_code: status.code(),
                output,
            })
        }
    }
}

/// Copy everything from a pipe into `sink` until EOF
async fn drain<R>(mut pipe: R, sink: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .extend_from_slice(&buf[..n]),
        }
    }
}

/// Stdout followed by stderr, decoded lossily
fn captured(stdout: &Mutex<Vec<u8>>, stderr: &Mutex<Vec<u8>>) -> String {
    let lock = |m: &Mutex<Vec<u8>>| {
        String::from_utf8_lossy(&m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .into_owned()
    };
    let mut output = lock(stdout);
    output.push_str(&lock(stderr));
    output
}
