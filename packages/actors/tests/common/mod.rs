use std::sync::{Arc, Mutex};
use std::time::Duration;

use distort_core::{JobEvent, JobId};
use pipeline::{ExecutorConfig, Job, PipelineExecutor, Stage, StageError};
use tempfile::TempDir;
use tokio::sync::{Notify, broadcast};
use workspace::{WorkspaceConfig, WorkspaceRoot};

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Executor writing workspaces under a fresh temporary root.
pub fn executor() -> (TempDir, PipelineExecutor) {
    let dir = tempfile::tempdir().unwrap();
    let root = WorkspaceRoot::new(WorkspaceConfig::new(dir.path().join("operations")));
    (dir, PipelineExecutor::new(root, ExecutorConfig::default()))
}

/// Stage that appends `<label>:<name>` to `log`.
pub fn logging_stage(label: &str, name: &str, log: &Log) -> Stage {
    let entry = format!("{label}:{name}");
    let log = log.clone();
    Stage::from_fn(name, move |_ctx| {
        let entry = entry.clone();
        let log = log.clone();
        async move {
            log.lock().unwrap().push(entry);
            Ok(())
        }
    })
}

/// Stage that blocks until `gate` is notified.
pub fn gated_stage(name: &str, gate: Arc<Notify>) -> Stage {
    Stage::from_fn(name, move |_ctx| {
        let gate = gate.clone();
        async move {
            gate.notified().await;
            Ok(())
        }
    })
}

pub fn failing_stage(name: &str) -> Stage {
    Stage::from_fn(name, |_ctx| async { Err(StageError::other("boom")) })
}

/// Job whose status lines are appended to `log` as `<label>:<text>`.
pub fn job(label: &str, stages: Vec<Stage>, log: &Log) -> Job {
    let prefix = label.to_string();
    let log = log.clone();
    Job::builder(label)
        .stages(stages)
        .notifier(move |_job_id: JobId, text: &str| {
            log.lock().unwrap().push(format!("{prefix}:{text}"));
        })
        .build()
}

/// Wait for the first event matching `pred`.
pub async fn next_event<F>(rx: &mut broadcast::Receiver<JobEvent>, mut pred: F) -> JobEvent
where
    F: FnMut(&JobEvent) -> bool,
{
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("timed out waiting for event")
}

pub fn is_finished(event: &JobEvent) -> bool {
    matches!(
        event,
        JobEvent::JobSucceeded { .. } | JobEvent::JobFailed { .. }
    )
}

/// Collect every event until `count` jobs have finished.
pub async fn until_finished(rx: &mut broadcast::Receiver<JobEvent>, count: usize) -> Vec<JobEvent> {
    let mut events = Vec::new();
    let mut finished = 0;
    while finished < count {
        let event = next_event(rx, |_| true).await;
        if is_finished(&event) {
            finished += 1;
        }
        events.push(event);
    }
    events
}
