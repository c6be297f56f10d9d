//! Process Runner: executes an agent's source and captures its output.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::clock::duration_ms;

/// Captured output of one agent execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn {source_ref}: {message}")]
    Spawn { source_ref: String, message: String },

    #[error("timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the agent at `source_ref`, giving up after `timeout`.
    ///
    /// Dropping the returned future must terminate the child.
    async fn run(&self, source_ref: &str, timeout: Duration) -> Result<ProcessOutput, RunnerError>;
}

/// Spawns agents as child processes, optionally through an interpreter.
///
/// With an interpreter the command line is `<interpreter> <args..> <source_ref>`;
/// without one it is `<source_ref> <args..>`.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    interpreter: Option<String>,
    args: Vec<String>,
}

impl CommandRunner {
    /// Execute `source_ref` directly.
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn with_interpreter(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: Some(interpreter.into()),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self, source_ref: &str) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interp) => {
                let mut cmd = Command::new(interp);
                cmd.args(&self.args).arg(source_ref);
                cmd
            }
            None => {
                let mut cmd = Command::new(source_ref);
                cmd.args(&self.args);
                cmd
            }
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so a timeout can take down anything the agent forked.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Kills the child's process group on drop unless disarmed. `kill_on_drop`
/// only reaches the direct child.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        tracing::debug!(pgid, error = %e, "agent process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn run(&self, source_ref: &str, timeout: Duration) -> Result<ProcessOutput, RunnerError> {
        let child = self
            .command(source_ref)
            .spawn()
            .map_err(|e| RunnerError::Spawn {
                source_ref: source_ref.to_string(),
                message: e.to_string(),
            })?;
        let mut guard = GroupGuard { pgid: child.id() };

        // On timeout or cancellation the guard kills the whole group.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| RunnerError::Timeout {
                timeout_ms: duration_ms(timeout),
            })??;
        guard.disarm();

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
