//! The worker loop: polls the queue, drives the engine, reports status.
//!
//! Single cooperative loop, one task in flight at a time. Multiple worker
//! processes may safely poll the same queue file — the queue's
//! conditional claim update is the only coordination needed.
//!
//! The per-task deadline is enforced here, not inside the engine: a
//! timeout abandons the in-flight engine invocation and records a task
//! failure without killing the worker. Cancellation is polled between
//! iterations; an in-flight task interrupted by shutdown stays `running`
//! for manual resolution on restart.

use forgeloop_core::error::StorageError;
use forgeloop_engine::{Engine, EngineOutcome, ExecutionContext};
use forgeloop_queue::TaskQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Outcome of a single poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerTick {
    /// Nothing to claim.
    Idle,
    /// One task was claimed and driven to a terminal status.
    Processed { task_id: i64, completed: bool },
}

/// The polling worker.
pub struct Worker {
    queue: Arc<TaskQueue>,
    engine: Arc<Engine>,
    poll_interval: Duration,
    task_timeout: Duration,
}

impl Worker {
    pub fn new(
        queue: Arc<TaskQueue>,
        engine: Arc<Engine>,
        poll_interval: Duration,
        task_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            engine,
            poll_interval,
            task_timeout,
        }
    }

    /// Perform one poll/claim/execute cycle.
    ///
    /// Engine failures and timeouts are recorded on the task and do not
    /// propagate — a bad task never stops the worker. Only queue storage
    /// errors surface to the caller.
    pub async fn run_once(&self) -> Result<WorkerTick, StorageError> {
        let Some(task) = self.queue.claim_next().await? else {
            return Ok(WorkerTick::Idle);
        };

        let ctx = ExecutionContext::new(task.id, task.instruction());
        info!(
            task_id = task.id,
            session_id = %ctx.session_id,
            "Processing task"
        );

        match tokio::time::timeout(self.task_timeout, self.engine.run(&ctx)).await {
            Ok(EngineOutcome::Completed { results }) => {
                info!(task_id = task.id, steps = results.len(), "Task completed");
                if let Err(e) = self.queue.complete(task.id).await {
                    warn!(task_id = task.id, error = %e, "Failed to record completion");
                }
                Ok(WorkerTick::Processed {
                    task_id: task.id,
                    completed: true,
                })
            }
            Ok(EngineOutcome::Failed { error, results }) => {
                warn!(
                    task_id = task.id,
                    executed_steps = results.len(),
                    error = %error,
                    "Task failed"
                );
                if let Err(e) = self.queue.fail(task.id, &error.to_string()).await {
                    warn!(task_id = task.id, error = %e, "Failed to record failure");
                }
                Ok(WorkerTick::Processed {
                    task_id: task.id,
                    completed: false,
                })
            }
            Err(_elapsed) => {
                let reason = format!(
                    "task timed out after {}s",
                    self.task_timeout.as_secs_f64()
                );
                warn!(task_id = task.id, "{reason}");
                if let Err(e) = self.queue.fail(task.id, &reason).await {
                    warn!(task_id = task.id, error = %e, "Failed to record timeout");
                }
                Ok(WorkerTick::Processed {
                    task_id: task.id,
                    completed: false,
                })
            }
        }
    }

    /// Run until the shutdown signal flips to `true`.
    ///
    /// The signal is checked between iterations only; it never interrupts
    /// an in-flight task.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_s = self.poll_interval.as_secs_f64(),
            task_timeout_s = self.task_timeout.as_secs_f64(),
            "Worker loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(WorkerTick::Processed { .. }) => {
                    // Immediately poll again while work is available.
                }
                Ok(WorkerTick::Idle) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    // Storage hiccup: back off and keep polling.
                    error!(error = %e, "Worker poll failed");
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!("Worker loop stopped");
    }
}
