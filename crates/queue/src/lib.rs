//! Durable SQLite-backed task queue.
//!
//! One table, WAL journal mode:
//! `tasks(id INTEGER PRIMARY KEY AUTOINCREMENT, created_at TEXT,
//! priority INTEGER DEFAULT 100, status TEXT, payload TEXT)`
//!
//! The conditional UPDATE in [`TaskQueue::claim_next`] is the only
//! concurrency-control mechanism: any number of worker processes can poll
//! the same queue file and at most one wins each task. Failure reasons
//! accumulate in a `_errors` array inside the payload JSON, so the table
//! schema never changes and the full forensic trail survives.

use chrono::Utc;
use forgeloop_core::error::StorageError;
use forgeloop_core::task::{Task, TaskError, TaskStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempt cap for `enqueue` on transient I/O errors.
const ENQUEUE_MAX_ATTEMPTS: u32 = 3;

/// Fixed backoff between enqueue attempts.
const ENQUEUE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Key inside the payload JSON where failure reasons accumulate.
const ERRORS_KEY: &str = "_errors";

/// A durable task queue over a single SQLite file.
pub struct TaskQueue {
    pool: SqlitePool,
}

impl TaskQueue {
    /// Open (or create) the queue store at the given path.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral store (useful
    /// for tests).
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        if !path.starts_with("sqlite:") {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StorageError::Open(format!("create {parent:?}: {e}")))?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StorageError::Open(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(60));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Open(format!("Failed to open SQLite: {e}")))?;

        let queue = Self { pool };
        queue.run_migrations().await?;
        info!("Task queue opened at {path}");
        Ok(queue)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at  TEXT NOT NULL,
                priority    INTEGER NOT NULL DEFAULT 100,
                status      TEXT NOT NULL DEFAULT 'pending',
                payload     TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Open(format!("tasks table: {e}")))?;

        // Covering index for the claim query
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_claim ON tasks(status, priority, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Open(format!("claim index: {e}")))?;

        debug!("Queue migrations complete");
        Ok(())
    }

    /// Insert a new pending task.
    ///
    /// Transient I/O errors are retried with fixed backoff up to the
    /// attempt cap; the pool discards the broken connection between
    /// attempts and the retry acquires a fresh one. Only after the cap is
    /// reached does a `StorageError` escape.
    pub async fn enqueue(
        &self,
        payload: serde_json::Value,
        priority: i64,
    ) -> Result<i64, StorageError> {
        let payload_text = payload.to_string();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.try_insert(&payload_text, priority).await {
                Ok(id) => {
                    debug!(task_id = id, priority, "Enqueued task");
                    return Ok(id);
                }
                Err(e) if is_transient(&e) && attempt < ENQUEUE_MAX_ATTEMPTS => {
                    warn!(
                        attempt,
                        max_attempts = ENQUEUE_MAX_ATTEMPTS,
                        error = %e,
                        "Transient I/O error on enqueue, retrying"
                    );
                    tokio::time::sleep(ENQUEUE_RETRY_DELAY).await;
                }
                Err(e) if is_transient(&e) => {
                    return Err(StorageError::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(StorageError::Query(format!("INSERT failed: {e}"))),
            }
        }
    }

    async fn try_insert(&self, payload: &str, priority: i64) -> Result<i64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO tasks (created_at, priority, status, payload) VALUES (?1, ?2, 'pending', ?3)",
        )
        .bind(&now)
        .bind(priority)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Atomically claim the next pending task, or `None` if the queue is
    /// empty or another claimant won the race.
    ///
    /// Selects the lowest-priority, lowest-id pending row, then performs
    /// a conditional update (`status='running' WHERE id=? AND
    /// status='pending'`). Zero rows affected means someone else claimed
    /// it first — the caller simply re-polls.
    pub async fn claim_next(&self) -> Result<Option<Task>, StorageError> {
        let row = sqlx::query(
            "SELECT id FROM tasks WHERE status = 'pending' ORDER BY priority ASC, id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(format!("claim select: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StorageError::Query(format!("id column: {e}")))?;

        let updated =
            sqlx::query("UPDATE tasks SET status = 'running' WHERE id = ?1 AND status = 'pending'")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(format!("claim update: {e}")))?;

        if updated.rows_affected() == 0 {
            // Another claimant won the race.
            debug!(task_id = id, "Lost claim race");
            return Ok(None);
        }

        let task = self
            .get(id)
            .await?
            .ok_or(StorageError::TaskNotFound(id))?;
        debug!(task_id = id, "Claimed task");
        Ok(Some(task))
    }

    /// Mark a task done.
    ///
    /// A no-op on tasks that are already terminal: status transitions are
    /// monotonic and never reverse.
    pub async fn complete(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE tasks SET status = 'done' WHERE id = ?1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(format!("complete: {e}")))?;

        debug!(task_id = id, "Task done");
        Ok(())
    }

    /// Mark a task failed and append `{when, reason}` to its error list.
    ///
    /// Previous reasons are preserved, never overwritten. Appending also
    /// works on already-failed tasks so a flapping task keeps its full
    /// history; a `done` task never changes status.
    pub async fn fail(&self, id: i64, reason: &str) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE tasks SET status = 'failed' WHERE id = ?1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(format!("fail: {e}")))?;

        let row = sqlx::query("SELECT payload FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("fail payload read: {e}")))?;

        let Some(row) = row else {
            return Err(StorageError::TaskNotFound(id));
        };
        let payload_text: String = row
            .try_get("payload")
            .map_err(|e| StorageError::Query(format!("payload column: {e}")))?;

        let mut payload: serde_json::Value = serde_json::from_str(&payload_text)
            .unwrap_or_else(|_| serde_json::json!({ "_raw": payload_text }));

        let entry = serde_json::json!({
            "when": Utc::now().to_rfc3339(),
            "reason": reason,
        });
        if !payload.is_object() {
            payload = serde_json::json!({ "_raw": payload });
        }
        if let Some(obj) = payload.as_object_mut() {
            let errors = obj
                .entry(ERRORS_KEY)
                .or_insert_with(|| serde_json::json!([]));
            match errors.as_array_mut() {
                Some(list) => list.push(entry),
                // A corrupt non-array trail is replaced rather than kept.
                None => *errors = serde_json::json!([entry]),
            }
        }

        sqlx::query("UPDATE tasks SET payload = ?1 WHERE id = ?2")
            .bind(payload.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("fail payload write: {e}")))?;

        warn!(task_id = id, reason, "Task failed");
        Ok(())
    }

    /// Number of tasks still waiting to be claimed.
    pub async fn pending_count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM tasks WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("pending count: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StorageError::Query(format!("cnt column: {e}")))?;
        Ok(cnt as u64)
    }

    /// Fetch a task by id, for audit and tests.
    pub async fn get(&self, id: i64) -> Result<Option<Task>, StorageError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("get by id: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_task(r)?)),
            None => Ok(None),
        }
    }

    /// Parse a `Task` from a SQLite row, splitting the `_errors` audit
    /// trail out of the stored payload.
    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, StorageError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StorageError::Query(format!("id column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::Query(format!("created_at column: {e}")))?;
        let priority: i64 = row
            .try_get("priority")
            .map_err(|e| StorageError::Query(format!("priority column: {e}")))?;
        let status_str: String = row
            .try_get("status")
            .map_err(|e| StorageError::Query(format!("status column: {e}")))?;
        let payload_text: String = row
            .try_get("payload")
            .map_err(|e| StorageError::Query(format!("payload column: {e}")))?;

        let status = TaskStatus::parse(&status_str).ok_or_else(|| StorageError::CorruptRow {
            id,
            reason: format!("unknown status '{status_str}'"),
        })?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let mut payload: serde_json::Value = serde_json::from_str(&payload_text)
            .map_err(|e| StorageError::CorruptRow {
                id,
                reason: format!("payload is not JSON: {e}"),
            })?;

        let errors = payload
            .as_object_mut()
            .and_then(|obj| obj.remove(ERRORS_KEY))
            .and_then(|v| serde_json::from_value::<Vec<TaskError>>(v).ok())
            .unwrap_or_default();

        Ok(Task {
            id,
            created_at,
            priority,
            status,
            payload,
            errors,
        })
    }
}

/// Whether a sqlx error is worth retrying: connection-level I/O trouble
/// or a busy/locked database, the failure modes of a queue file on a slow
/// or contended filesystem.
fn is_transient(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            let msg = db.message().to_lowercase();
            msg.contains("disk i/o error")
                || msg.contains("database is locked")
                || msg.contains("database table is locked")
        }
        _ => false,
    }
}
