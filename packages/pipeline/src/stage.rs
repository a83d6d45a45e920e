//! Stage trait and the context stages run in.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use distort_core::JobId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::error::StageError;
use crate::notifier::Progress;

/// Future type for async stage steps.
pub type StageFuture = Pin<Box<dyn Future<Output = Result<(), StageError>> + Send>>;

/// Trait for the work behind a stage.
///
/// Implement this trait for reusable steps; use [`Stage::from_fn`] for
/// one-off closures.
pub trait StageStep: Send + Sync + 'static {
    /// Run the step. Artifacts for later stages go into `ctx`.
    fn run(&self, ctx: StageContext) -> StageFuture;
}

/// A simple function-based stage step.
pub struct FnStep<F> {
    step: F,
}

impl<F> FnStep<F> {
    pub fn new(step: F) -> Self {
        Self { step }
    }
}

impl<F, Fut> StageStep for FnStep<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), StageError>> + Send + 'static,
{
    fn run(&self, ctx: StageContext) -> StageFuture {
        Box::pin((self.step)(ctx))
    }
}

/// One named step of a job's pipeline.
#[derive(Clone)]
pub struct Stage {
    name: String,
    status: Option<String>,
    step: Arc<dyn StageStep>,
}

impl Stage {
    pub fn new(name: impl Into<String>, step: impl StageStep) -> Self {
        Self {
            name: name.into(),
            status: None,
            step: Arc::new(step),
        }
    }

    pub fn from_fn<F, Fut>(name: impl Into<String>, step: F) -> Self
    where
        F: Fn(StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        Self::new(name, FnStep::new(step))
    }

    /// Text shown to the submitter when the stage starts.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Status text, falling back to the stage name.
    pub fn status_text(&self) -> &str {
        self.status.as_deref().unwrap_or(&self.name)
    }

    pub fn step(&self) -> Arc<dyn StageStep> {
        self.step.clone()
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Named outputs that later stages consume.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    paths: HashMap<String, PathBuf>,
    values: HashMap<String, serde_json::Value>,
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_path(&mut self, key: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(key.into(), path.into());
    }

    pub fn path(&self, key: &str) -> Option<&Path> {
        self.paths.get(key).map(PathBuf::as_path)
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    pub fn value(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }
}

/// Everything a running stage can see: its job, the workspace directory,
/// artifacts from earlier stages and a progress handle.
///
/// Cheap to clone; clones share the same artifact set.
#[derive(Clone)]
pub struct StageContext {
    job_id: JobId,
    dir: PathBuf,
    artifacts: Arc<Mutex<Artifacts>>,
    progress: Progress,
}

impl StageContext {
    pub fn new(job_id: JobId, dir: impl Into<PathBuf>, progress: Progress) -> Self {
        Self {
            job_id,
            dir: dir.into(),
            artifacts: Arc::new(Mutex::new(Artifacts::new())),
            progress,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// The job's workspace directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Create (if needed) and return a workspace subdirectory.
    pub async fn subdir(&self, name: &str) -> Result<PathBuf, StageError> {
        let dir = self.dir.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub async fn put_path(&self, key: impl Into<String>, path: impl Into<PathBuf>) {
        self.artifacts.lock().await.insert_path(key, path);
    }

    pub async fn path(&self, key: &str) -> Result<PathBuf, StageError> {
        self.artifacts
            .lock()
            .await
            .path(key)
            .map(Path::to_path_buf)
            .ok_or_else(|| StageError::MissingArtifact(key.to_string()))
    }

    pub async fn put_value<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StageError> {
        let value = serde_json::to_value(value).map_err(|source| StageError::InvalidArtifact {
            key: key.to_string(),
            source,
        })?;
        self.artifacts.lock().await.insert_value(key, value);
        Ok(())
    }

    pub async fn value<T: DeserializeOwned>(&self, key: &str) -> Result<T, StageError> {
        let value = self
            .artifacts
            .lock()
            .await
            .value(key)
            .cloned()
            .ok_or_else(|| StageError::MissingArtifact(key.to_string()))?;
        serde_json::from_value(value).map_err(|source| StageError::InvalidArtifact {
            key: key.to_string(),
            source,
        })
    }

    /// Snapshot of the current artifact set.
    pub async fn artifacts(&self) -> Artifacts {
        self.artifacts.lock().await.clone()
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("job_id", &self.job_id)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use crate::notifier::NoopNotifier;
    use std::time::Duration;

    fn context() -> StageContext {
        let job_id = JobId::new();
        let progress = Progress::new(job_id, Arc::new(NoopNotifier), Duration::from_secs(5));
        StageContext::new(job_id, "/tmp/unused", progress)
    }

    #[tokio::test]
    async fn artifacts_are_shared_between_clones() -> Result<(), StageError> {
        let ctx = context();
        let other = ctx.clone();

        ctx.put_path("input", "/tmp/unused/input.mp4").await;
        ctx.put_value("dimensions", &(640u32, 480u32)).await?;

        assert_eq!(other.path("input").await?, PathBuf::from("/tmp/unused/input.mp4"));
        let (w, h): (u32, u32) = other.value("dimensions").await?;
        assert_eq!((w, h), (640, 480));
        Ok(())
    }

    #[tokio::test]
    async fn missing_and_mistyped_artifacts_fail() {
        let ctx = context();
        assert!(matches!(
            ctx.path("output").await,
            Err(StageError::MissingArtifact(key)) if key == "output"
        ));

        ctx.put_value("sample_rate", &"not a number").await.unwrap();
        assert!(matches!(
            ctx.value::<u32>("sample_rate").await,
            Err(StageError::InvalidArtifact { .. })
        ));
    }

    #[test]
    fn status_text_defaults_to_name() {
        let plain = Stage::from_fn("probe", |_ctx| async { Ok(()) });
        assert_eq!(plain.status_text(), "probe");

        let described = plain.clone().with_status("Verifying...");
        assert_eq!(described.name(), "probe");
        assert_eq!(described.status_text(), "Verifying...");
    }
}
