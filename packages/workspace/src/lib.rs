//! Disposable per-job scratch directories.
//!
//! Every job gets `<root>/<job_id>` for its intermediate and final
//! artifacts. The directory is created right before the job's first stage
//! and removed after its last one, whatever the outcome.

use std::io;
use std::path::{Path, PathBuf};

use distort_core::JobId;

/// Default scratch root, relative to the working directory.
pub const DEFAULT_ROOT: &str = "./local/operations";

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WorkspaceError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
}

impl WorkspaceConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

/// Process-wide scratch root that hands out per-job workspaces.
#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    pub fn new(cfg: WorkspaceConfig) -> Self {
        Self { root: cfg.root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of a job's workspace.
    pub fn path_for(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Create the workspace for `job_id`. Creating it twice is fine.
    pub async fn create(&self, job_id: JobId) -> Result<Workspace, WorkspaceError> {
        let path = self.path_for(job_id);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| WorkspaceError::io(&path, e))?;
        tracing::debug!("Created workspace {:?}", path);

        Ok(Workspace {
            path,
            released: false,
        })
    }
}

/// A job's scratch directory.
///
/// Call [`Workspace::destroy`] to release it. If the handle is dropped
/// without being destroyed (a panic or a dropped future), the directory is
/// removed synchronously in `Drop`.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively remove the workspace.
    ///
    /// A directory that is already gone counts as removed. Any other error
    /// is returned for logging; the directory is not retried.
    pub async fn destroy(mut self) -> Result<(), WorkspaceError> {
        self.released = true;
        remove_dir(&self.path).await
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Blocking on purpose: `Drop` cannot await, and this only runs for a
        // job that was abandoned mid-run.
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!("Removed abandoned workspace {:?}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove abandoned workspace {:?}: {}", self.path, e),
        }
    }
}

/// Best-effort recursive delete. A missing directory is not an error.
pub async fn remove_dir(path: &Path) -> Result<(), WorkspaceError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            tracing::debug!("Removed workspace {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkspaceError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[tokio::test]
    async fn create_is_idempotent_and_destroy_removes() -> Result<(), WorkspaceError> {
        let dir = tempfile::tempdir().map_err(|e| WorkspaceError::io(Path::new("tmp"), e))?;
        let root = WorkspaceRoot::new(WorkspaceConfig::new(dir.path()));
        let job_id = JobId::new();

        let first = root.create(job_id).await?;
        let frames = first.path().join("original");
        tokio::fs::create_dir_all(&frames)
            .await
            .map_err(|e| WorkspaceError::io(&frames, e))?;
        tokio::fs::write(frames.join("1.jpg"), b"frame")
            .await
            .map_err(|e| WorkspaceError::io(&frames, e))?;

        // Retried setup for the same job must not fail.
        let second = root.create(job_id).await?;
        assert_eq!(first.path(), second.path());
        assert_eq!(first.path(), root.path_for(job_id));

        first.destroy().await?;
        assert!(!root.path_for(job_id).exists());

        // Already gone: still fine.
        second.destroy().await?;
        Ok(())
    }

    #[tokio::test]
    async fn dropped_handle_cleans_up() -> Result<(), WorkspaceError> {
        let dir = tempfile::tempdir().map_err(|e| WorkspaceError::io(Path::new("tmp"), e))?;
        let root = WorkspaceRoot::new(WorkspaceConfig::new(dir.path()));
        let job_id = JobId::new();

        let workspace = root.create(job_id).await?;
        assert!(workspace.path().is_dir());
        drop(workspace);

        assert!(!root.path_for(job_id).exists());
        Ok(())
    }

    #[tokio::test]
    async fn remove_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_dir(&dir.path().join("never-created")).await.is_ok());
    }

    #[test]
    fn distinct_jobs_get_distinct_paths() {
        let root = WorkspaceRoot::new(WorkspaceConfig::default());
        assert_ne!(root.path_for(JobId::new()), root.path_for(JobId::new()));
        assert!(root.path().ends_with("operations"));
    }
}
