//! The child-process handle the supervisor drives.
//!
//! The supervisor never imports worker internals; the only signal it
//! consumes is the exit code delivered here.

use crate::GuardianError;
use async_trait::async_trait;
use tracing::{debug, info};

/// A handle that spawns the worker process and waits for it to exit.
#[async_trait]
pub trait WorkerChild: Send {
    /// Spawn one worker process and block until it exits, returning the
    /// exit code. A process killed by a signal reports a synthetic
    /// non-zero code.
    async fn run(&mut self) -> Result<i32, GuardianError>;
}

/// Runs a configured command as the worker process, inheriting stdio so
/// the worker stays fully interactive and logs to its own sinks.
pub struct CommandChild {
    program: String,
    args: Vec<String>,
}

impl CommandChild {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl WorkerChild for CommandChild {
    async fn run(&mut self) -> Result<i32, GuardianError> {
        info!(program = %self.program, args = ?self.args, "Spawning worker process");

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .spawn()
            .map_err(|e| GuardianError::Spawn(format!("{}: {e}", self.program)))?;

        if let Some(pid) = child.id() {
            debug!(pid, "Worker process started");
        }

        let status = child
            .wait()
            .await
            .map_err(|e| GuardianError::Spawn(format!("wait for {}: {e}", self.program)))?;

        // Signal-terminated processes have no code; report as a crash.
        let code = status.code().unwrap_or(-1);
        info!(exit_code = code, "Worker process exited");
        Ok(code)
    }
}
