use std::sync::{Arc, Mutex};

use distort_core::JobId;
use pipeline::{ExecutorConfig, Notifier, PipelineExecutor, Stage, StageError};
use tempfile::TempDir;
use workspace::{WorkspaceConfig, WorkspaceRoot};

/// Notifier that keeps every status line.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn texts(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Notifier for Recorder {
    fn notify(&self, _job_id: JobId, text: &str) {
        self.seen.lock().unwrap().push(text.to_string());
    }
}

/// Executor writing workspaces under a fresh temporary root.
pub fn executor(config: ExecutorConfig) -> (TempDir, PipelineExecutor) {
    let dir = tempfile::tempdir().unwrap();
    let root = WorkspaceRoot::new(WorkspaceConfig::new(dir.path().join("operations")));
    (dir, PipelineExecutor::new(root, config))
}

/// Stage that records its name in `log` and leaves a file in the workspace.
pub fn recording_stage(name: &str, log: Arc<Mutex<Vec<String>>>) -> Stage {
    let stage_name = name.to_string();
    Stage::from_fn(name, move |ctx| {
        let log = log.clone();
        let stage_name = stage_name.clone();
        async move {
            tokio::fs::write(ctx.file(&format!("{stage_name}.out")), b"ok").await?;
            log.lock().unwrap().push(stage_name);
            Ok(())
        }
    })
    .with_status(format!("Running {name}..."))
}

pub fn failing_stage(name: &str) -> Stage {
    Stage::from_fn(name, |_ctx| async { Err(StageError::other("boom")) })
}
