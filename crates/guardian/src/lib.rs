//! The process supervisor.
//!
//! Spawns the worker as a child OS process, blocks until it exits, and
//! classifies the exit: code 0 is a clean shutdown, anything else is a
//! crash. Crashes are restarted after a fixed delay; once the
//! consecutive-failure threshold is reached, the supervisor first rolls
//! the working tree back to the last known good revision (the one
//! irreversible corrective action in the system) and resets the counter.
//! A rollback that itself fails is the single fatal condition: the
//! supervisor returns the error rather than looping.
//!
//! There is no shared memory with the worker. Communication is exit
//! codes and the filesystem: the queue store, the revision marker file,
//! and crash report files.

pub mod process;
pub mod revision;

use chrono::Utc;
use process::WorkerChild;
use revision::{RevisionControl, read_marker, write_marker};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("Failed to run worker process: {0}")]
    Spawn(String),

    #[error("Revision control operation failed: {0}")]
    Revision(String),

    #[error("Revision marker I/O failed: {0}")]
    Marker(String),
}

/// What to do when the worker exits cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// A clean exit ends supervision (interactive / one-shot use).
    OnCrash,
    /// Always restart after the delay (always-on daemon use).
    Always,
}

/// Summary of a finished supervision run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianReport {
    /// Worker restarts performed (crash or always-on).
    pub restarts: u32,
    /// Rollbacks performed.
    pub rollbacks: u32,
}

/// The supervisor state machine driving one worker child at a time.
pub struct Guardian {
    child: Box<dyn WorkerChild>,
    revisions: Box<dyn RevisionControl>,
    marker_path: PathBuf,
    crash_log_dir: Option<PathBuf>,
    crash_threshold: u32,
    restart_delay: Duration,
    policy: RestartPolicy,

    consecutive_failures: u32,
    restarts: u32,
    rollbacks: u32,
}

impl Guardian {
    pub fn new(
        child: Box<dyn WorkerChild>,
        revisions: Box<dyn RevisionControl>,
        marker_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            child,
            revisions,
            marker_path: marker_path.into(),
            crash_log_dir: None,
            crash_threshold: 3,
            restart_delay: Duration::from_secs(5),
            policy: RestartPolicy::OnCrash,
            consecutive_failures: 0,
            restarts: 0,
            rollbacks: 0,
        }
    }

    /// Consecutive non-zero exits before a rollback is triggered.
    pub fn with_crash_threshold(mut self, threshold: u32) -> Self {
        self.crash_threshold = threshold.max(1);
        self
    }

    /// Delay between restarts. Exists to prevent restart storms, not for
    /// state-machine correctness.
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn with_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Directory for per-crash report files. Disabled when unset.
    pub fn with_crash_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.crash_log_dir = Some(dir.into());
        self
    }

    /// Supervise until a clean exit (`OnCrash` policy) or a fatal error.
    pub async fn run(&mut self) -> Result<GuardianReport, GuardianError> {
        info!(
            crash_threshold = self.crash_threshold,
            restart_delay_s = self.restart_delay.as_secs_f64(),
            policy = ?self.policy,
            "Guardian started"
        );

        loop {
            let code = self.child.run().await?;

            if code == 0 {
                info!("Worker exited cleanly");
                self.consecutive_failures = 0;
                match self.policy {
                    RestartPolicy::OnCrash => {
                        info!(
                            restarts = self.restarts,
                            rollbacks = self.rollbacks,
                            "Guardian stopping after clean exit"
                        );
                        return Ok(GuardianReport {
                            restarts: self.restarts,
                            rollbacks: self.rollbacks,
                        });
                    }
                    RestartPolicy::Always => {
                        self.restarts += 1;
                        info!("Always-on policy, restarting worker");
                        tokio::time::sleep(self.restart_delay).await;
                        continue;
                    }
                }
            }

            self.consecutive_failures += 1;
            error!(
                exit_code = code,
                consecutive_failures = self.consecutive_failures,
                threshold = self.crash_threshold,
                "Worker crashed"
            );
            self.write_crash_report(code).await;

            if self.consecutive_failures >= self.crash_threshold {
                // Fatal on error: never loop through a failing rollback.
                self.roll_back().await?;
                self.consecutive_failures = 0;
            }

            self.restarts += 1;
            info!(
                delay_s = self.restart_delay.as_secs_f64(),
                "Restarting worker"
            );
            tokio::time::sleep(self.restart_delay).await;
        }
    }

    /// Resolve the last known good revision, initializing the marker
    /// file from the current revision on first run.
    async fn last_known_good_revision(&self) -> Result<String, GuardianError> {
        if let Some(revision) = read_marker(&self.marker_path).await? {
            return Ok(revision);
        }

        let current = self.revisions.current_revision().await?;
        warn!(
            marker = %self.marker_path.display(),
            revision = %current,
            "Revision marker missing, initializing from current revision"
        );
        write_marker(&self.marker_path, &current).await?;
        Ok(current)
    }

    /// The one irreversible corrective action: discard the working tree
    /// and hard-reset to the last known good revision. Logged distinctly
    /// from an ordinary restart.
    async fn roll_back(&mut self) -> Result<(), GuardianError> {
        let revision = self.last_known_good_revision().await?;
        error!(
            revision = %revision,
            consecutive_failures = self.consecutive_failures,
            "ROLLBACK: crash threshold reached, resetting working tree"
        );

        self.revisions.reset_hard_to(&revision).await?;
        self.revisions.discard_untracked().await?;

        self.rollbacks += 1;
        warn!(revision = %revision, "Rollback complete");
        Ok(())
    }

    /// Best effort: a missing or read-only log directory must never take
    /// the supervisor down.
    async fn write_crash_report(&self, exit_code: i32) {
        let Some(dir) = &self.crash_log_dir else {
            return;
        };

        let now = Utc::now();
        let path = dir.join(format!(
            "crash_{}_exit{exit_code}.log",
            now.format("%Y%m%d_%H%M%S%3f")
        ));
        let report = format!(
            "WORKER CRASH REPORT\n\
             Timestamp: {}\n\
             Exit code: {exit_code}\n\
             Consecutive failures: {}\n\
             Restart #: {}\n",
            now.to_rfc3339(),
            self.consecutive_failures,
            self.restarts + 1,
        );

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(error = %e, "Could not create crash log directory");
            return;
        }
        match tokio::fs::write(&path, report).await {
            Ok(()) => info!(path = %path.display(), "Crash report written"),
            Err(e) => warn!(error = %e, "Could not write crash report"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Child that replays a script of exit codes, then errors out to end
    /// the run.
    struct ScriptedChild {
        codes: VecDeque<i32>,
    }

    impl ScriptedChild {
        fn new(codes: &[i32]) -> Box<Self> {
            Box::new(Self {
                codes: codes.iter().copied().collect(),
            })
        }
    }

    #[async_trait]
    impl WorkerChild for ScriptedChild {
        async fn run(&mut self) -> Result<i32, GuardianError> {
            self.codes
                .pop_front()
                .ok_or_else(|| GuardianError::Spawn("script exhausted".into()))
        }
    }

    /// Revision control fake recording every call through shared handles,
    /// so the calls stay inspectable after the fake moves into the guardian.
    struct FakeRevisions {
        current: String,
        resets: Arc<Mutex<Vec<String>>>,
        discards: Arc<AtomicUsize>,
        fail_reset: bool,
    }

    impl FakeRevisions {
        fn new(current: &str) -> Self {
            Self {
                current: current.into(),
                resets: Arc::new(Mutex::new(Vec::new())),
                discards: Arc::new(AtomicUsize::new(0)),
                fail_reset: false,
            }
        }

        fn failing(current: &str) -> Self {
            Self {
                fail_reset: true,
                ..Self::new(current)
            }
        }
    }

    #[async_trait]
    impl RevisionControl for FakeRevisions {
        async fn current_revision(&self) -> Result<String, GuardianError> {
            Ok(self.current.clone())
        }

        async fn reset_hard_to(&self, revision: &str) -> Result<(), GuardianError> {
            if self.fail_reset {
                return Err(GuardianError::Revision("reset refused".into()));
            }
            self.resets.lock().unwrap().push(revision.to_string());
            Ok(())
        }

        async fn discard_untracked(&self) -> Result<(), GuardianError> {
            self.discards.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn marker_in(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join(".last_known_good_revision")
    }

    #[tokio::test]
    async fn clean_exit_stops_supervision() {
        let dir = tempfile::tempdir().unwrap();
        let mut guardian = Guardian::new(
            ScriptedChild::new(&[0]),
            Box::new(FakeRevisions::new("rev-1")),
            marker_in(&dir),
        )
        .with_restart_delay(Duration::ZERO);

        let report = guardian.run().await.unwrap();
        assert_eq!(report, GuardianReport { restarts: 0, rollbacks: 0 });
    }

    #[tokio::test]
    async fn crashes_below_threshold_restart_without_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let mut guardian = Guardian::new(
            ScriptedChild::new(&[1, 1, 0]),
            Box::new(FakeRevisions::new("rev-1")),
            marker_in(&dir),
        )
        .with_crash_threshold(3)
        .with_restart_delay(Duration::ZERO);

        let report = guardian.run().await.unwrap();
        assert_eq!(report.restarts, 2);
        assert_eq!(report.rollbacks, 0);
        // The marker is only touched during a rollback.
        assert!(!marker_in(&dir).exists());
    }

    #[tokio::test]
    async fn rollback_after_exactly_threshold_crashes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);
        let revisions = FakeRevisions::new("rev-good");
        let resets = revisions.resets.clone();
        let discards = revisions.discards.clone();
        let mut guardian =
            Guardian::new(ScriptedChild::new(&[2, 2, 2, 0]), Box::new(revisions), &marker)
                .with_crash_threshold(3)
                .with_restart_delay(Duration::ZERO);

        let report = guardian.run().await.unwrap();
        assert_eq!(report.rollbacks, 1);
        assert_eq!(report.restarts, 3);

        // Marker initialized from the current revision on first rollback.
        let stored = tokio::fs::read_to_string(&marker).await.unwrap();
        assert_eq!(stored.trim(), "rev-good");

        assert_eq!(resets.lock().unwrap().as_slice(), ["rev-good"]);
        assert_eq!(discards.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clean_exit_resets_consecutive_failures() {
        let dir = tempfile::tempdir().unwrap();
        // Two crashes, a clean exit, two more crashes: with threshold 3
        // and the Always policy, no rollback may ever happen.
        let mut guardian = Guardian::new(
            ScriptedChild::new(&[1, 1, 0, 1, 1]),
            Box::new(FakeRevisions::new("rev-1")),
            marker_in(&dir),
        )
        .with_crash_threshold(3)
        .with_restart_delay(Duration::ZERO)
        .with_policy(RestartPolicy::Always);

        // The script runs dry and surfaces as a spawn error; what matters
        // is the rollback count up to that point.
        let err = guardian.run().await.unwrap_err();
        assert!(matches!(err, GuardianError::Spawn(_)));
        assert_eq!(guardian.rollbacks, 0);
        assert!(!marker_in(&dir).exists());
    }

    #[tokio::test]
    async fn counter_resets_after_rollback() {
        let dir = tempfile::tempdir().unwrap();
        // Six crashes with threshold 3: exactly two rollbacks.
        let mut guardian = Guardian::new(
            ScriptedChild::new(&[1, 1, 1, 1, 1, 1, 0]),
            Box::new(FakeRevisions::new("rev-1")),
            marker_in(&dir),
        )
        .with_crash_threshold(3)
        .with_restart_delay(Duration::ZERO);

        let report = guardian.run().await.unwrap();
        assert_eq!(report.rollbacks, 2);
    }

    #[tokio::test]
    async fn existing_marker_wins_over_current_revision() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);
        tokio::fs::write(&marker, "rev-pinned\n").await.unwrap();

        let revisions = FakeRevisions::new("rev-current");
        let resets = revisions.resets.clone();
        let mut guardian =
            Guardian::new(ScriptedChild::new(&[1, 1, 1, 0]), Box::new(revisions), &marker)
                .with_crash_threshold(3)
                .with_restart_delay(Duration::ZERO);

        guardian.run().await.unwrap();

        assert_eq!(resets.lock().unwrap().as_slice(), ["rev-pinned"]);
        // The pinned marker is not overwritten.
        let stored = tokio::fs::read_to_string(&marker).await.unwrap();
        assert_eq!(stored.trim(), "rev-pinned");
    }

    #[tokio::test]
    async fn rollback_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut guardian = Guardian::new(
            ScriptedChild::new(&[1, 1, 1, 0]),
            Box::new(FakeRevisions::failing("rev-1")),
            marker_in(&dir),
        )
        .with_crash_threshold(3)
        .with_restart_delay(Duration::ZERO);

        let err = guardian.run().await.unwrap_err();
        assert!(matches!(err, GuardianError::Revision(_)));
    }

    #[tokio::test]
    async fn crash_reports_written_per_crash() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let mut guardian = Guardian::new(
            ScriptedChild::new(&[3, 5, 0]),
            Box::new(FakeRevisions::new("rev-1")),
            marker_in(&dir),
        )
        .with_crash_threshold(10)
        .with_restart_delay(Duration::ZERO)
        .with_crash_log_dir(&logs);

        guardian.run().await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&logs)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.ends_with("exit3.log")));
        assert!(names.iter().any(|n| n.ends_with("exit5.log")));
    }

    #[tokio::test]
    async fn always_policy_restarts_after_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut guardian = Guardian::new(
            ScriptedChild::new(&[0, 0]),
            Box::new(FakeRevisions::new("rev-1")),
            marker_in(&dir),
        )
        .with_restart_delay(Duration::ZERO)
        .with_policy(RestartPolicy::Always);

        let err = guardian.run().await.unwrap_err();
        assert!(matches!(err, GuardianError::Spawn(_)));
        assert_eq!(guardian.restarts, 2);
    }
}
