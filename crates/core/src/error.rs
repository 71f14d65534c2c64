//! Error types for the Forgeloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; recovery policy lives with
//! the component that owns the context (the queue retries storage errors,
//! the registry isolates load errors, the engine surfaces validation and
//! execution errors on the task record).

use thiserror::Error;

/// The top-level error type for all Forgeloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Queue storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Plugin errors ---
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    // --- Planner errors ---
    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),

    // --- Engine errors ---
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures in the durable queue's storage layer.
///
/// Transient variants are retried inside the queue with fixed backoff and
/// only escape after the attempt cap is reached.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open queue store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Enqueue failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Task {0} not found")]
    TaskNotFound(i64),

    #[error("Corrupt task row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
}

#[derive(Debug, Error)]
pub enum PluginError {
    /// A provider constructor failed. Isolated at registry load: logged
    /// and skipped, never aborts the load of remaining providers.
    #[error("Plugin load failed: {name} — {reason}")]
    Load { name: String, reason: String },

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Operation not found: {plugin}.{operation}")]
    OperationNotFound { plugin: String, operation: String },

    #[error("Plugin execution failed: {plugin}.{operation} — {reason}")]
    Execution {
        plugin: String,
        operation: String,
        reason: String,
    },

    #[error("Invalid plugin arguments: {0}")]
    InvalidArguments(String),

    #[error("Duplicate plugin name within kind: {0}")]
    DuplicateName(String),
}

/// Failures from the LLM planning capability.
#[derive(Debug, Clone, Error)]
pub enum PlannerError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Planner returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Failures of a single engine run. Each failure belongs to exactly one
/// pipeline phase; the worker records `to_string()` on the task.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Planning failed: {0}")]
    Planning(String),

    /// Arguments failed schema validation and the single repair attempt
    /// did not produce a valid replacement.
    #[error("Step {step} failed validation: {detail}")]
    Validation { step: usize, detail: String },

    /// The plan referenced a tool or operation the registry does not
    /// know. Not a repair target: tool identity is never guessed.
    #[error("Step {step} targets unknown operation {tool}.{method}")]
    UnknownOperation {
        step: usize,
        tool: String,
        method: String,
    },

    #[error("Step {step} execution failed: {reason}")]
    Execution { step: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_displays_attempts() {
        let err = Error::Storage(StorageError::RetriesExhausted {
            attempts: 3,
            last_error: "disk I/O error".into(),
        });
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("disk I/O error"));
    }

    #[test]
    fn engine_error_carries_step_index() {
        let err = EngineError::Validation {
            step: 2,
            detail: "missing required field 'path'".into(),
        };
        assert!(err.to_string().contains("Step 2"));
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn unknown_operation_names_both_parts() {
        let err = EngineError::UnknownOperation {
            step: 0,
            tool: "filesystem".into(),
            method: "shred".into(),
        };
        assert!(err.to_string().contains("filesystem.shred"));
    }

    #[test]
    fn plugin_execution_error_displays() {
        let err = Error::Plugin(PluginError::Execution {
            plugin: "shell".into(),
            operation: "run_command".into(),
            reason: "exit code 127".into(),
        });
        assert!(err.to_string().contains("shell.run_command"));
        assert!(err.to_string().contains("127"));
    }
}
