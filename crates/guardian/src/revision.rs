//! Revision control abstraction for the rollback path.
//!
//! The supervisor only needs three operations; keeping them behind a
//! trait lets the rollback state machine be tested without a real
//! repository.

use crate::GuardianError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

/// The minimal VCS surface the supervisor needs.
#[async_trait]
pub trait RevisionControl: Send + Sync {
    /// The identifier of the currently checked-out revision.
    async fn current_revision(&self) -> Result<String, GuardianError>;

    /// Hard-reset all tracked files to the given revision.
    async fn reset_hard_to(&self, revision: &str) -> Result<(), GuardianError>;

    /// Remove untracked files and directories from the working tree.
    async fn discard_untracked(&self) -> Result<(), GuardianError>;
}

/// Git-backed revision control, shelling out to the `git` binary.
pub struct GitRevisionControl {
    repo_root: PathBuf,
}

impl GitRevisionControl {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String, GuardianError> {
        debug!(?args, root = %self.repo_root.display(), "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .await
            .map_err(|e| GuardianError::Revision(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(?args, stderr = %stderr, "git command failed");
            return Err(GuardianError::Revision(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl RevisionControl for GitRevisionControl {
    async fn current_revision(&self) -> Result<String, GuardianError> {
        self.git(&["rev-parse", "HEAD"]).await
    }

    async fn reset_hard_to(&self, revision: &str) -> Result<(), GuardianError> {
        self.git(&["reset", "--hard", revision]).await?;
        Ok(())
    }

    async fn discard_untracked(&self) -> Result<(), GuardianError> {
        self.git(&["clean", "-dfx"]).await?;
        Ok(())
    }
}

/// Read the single-line revision marker file, if present.
pub async fn read_marker(path: &Path) -> Result<Option<String>, GuardianError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let revision = contents.trim().to_string();
            if revision.is_empty() {
                Ok(None)
            } else {
                Ok(Some(revision))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GuardianError::Marker(format!(
            "read {}: {e}",
            path.display()
        ))),
    }
}

/// Write the revision marker file (single line, trailing newline).
pub async fn write_marker(path: &Path, revision: &str) -> Result<(), GuardianError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GuardianError::Marker(format!("create {}: {e}", parent.display())))?;
        }
    }
    tokio::fs::write(path, format!("{revision}\n"))
        .await
        .map_err(|e| GuardianError::Marker(format!("write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn marker_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join(".last_known_good");

        assert_eq!(read_marker(&path).await.unwrap(), None);

        write_marker(&path, "abc123").await.unwrap();
        assert_eq!(read_marker(&path).await.unwrap(), Some("abc123".into()));
    }

    #[tokio::test]
    async fn marker_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        tokio::fs::write(&path, "  abc123\n\n").await.unwrap();
        assert_eq!(read_marker(&path).await.unwrap(), Some("abc123".into()));
    }

    #[tokio::test]
    async fn empty_marker_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        tokio::fs::write(&path, "\n").await.unwrap();
        assert_eq!(read_marker(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn current_revision_outside_repo_errors() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitRevisionControl::new(dir.path());
        assert!(git.current_revision().await.is_err());
    }
}
