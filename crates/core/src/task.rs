//! Task — the durable unit of work tracked by the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
///
/// Transitions are monotonic: `Pending → Running → {Done | Failed}`.
/// The queue enforces this; nothing ever moves a task backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    /// Done and Failed are terminal; a terminal task is never claimed again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "done" => Some(TaskStatus::Done),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// One recorded failure. Reasons accumulate; they are never overwritten,
/// so a flapping task keeps its full forensic trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub when: DateTime<Utc>,
    pub reason: String,
}

/// A durable unit of work.
///
/// Owned exclusively by the queue and mutated only through its
/// claim/complete/fail operations. Tasks are retained after completion
/// for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub created_at: DateTime<Utc>,

    /// Lower value = served first; ties broken by id ascending.
    pub priority: i64,

    pub status: TaskStatus,

    /// Arbitrary JSON payload supplied at enqueue time.
    pub payload: serde_json::Value,

    /// Accumulated failure reasons, oldest first.
    #[serde(default)]
    pub errors: Vec<TaskError>,
}

impl Task {
    /// Extract the instruction string from the payload.
    ///
    /// Checks `instruction`, then `user_input`, then falls back to the
    /// raw payload rendered as a string.
    pub fn instruction(&self) -> String {
        for key in ["instruction", "user_input"] {
            if let Some(s) = self.payload.get(key).and_then(|v| v.as_str()) {
                return s.to_string();
            }
        }
        self.payload.to_string()
    }
}
