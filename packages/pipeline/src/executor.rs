//! Runs one job's stages inside its workspace.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use distort_core::JobEvent;
use futures_util::FutureExt;
use tokio::sync::broadcast;
use workspace::WorkspaceRoot;

use crate::error::{PipelineError, StageError};
use crate::job::Job;
use crate::notifier::Progress;
use crate::stage::{Stage, StageContext};

/// Shown when every stage succeeded.
pub const DONE_MESSAGE: &str = "Done!";

/// Shown on any failure. Raw errors only go to the log.
pub const FAILURE_MESSAGE: &str = "Sorry, something went wrong. Please try another file!";

/// Executor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Minimum time between throttled progress reports.
    pub progress_interval: Duration,
    /// Upper bound for a single stage. `None` leaves timeouts to the
    /// operations themselves.
    pub stage_timeout: Option<Duration>,
    pub done_message: String,
    pub failure_message: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_secs(5),
            stage_timeout: None,
            done_message: DONE_MESSAGE.to_string(),
            failure_message: FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Runs jobs. Holds no per-job state, so one executor serves every job.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    workspaces: WorkspaceRoot,
    config: ExecutorConfig,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl PipelineExecutor {
    pub fn new(workspaces: WorkspaceRoot, config: ExecutorConfig) -> Self {
        Self {
            workspaces,
            config,
            event_tx: None,
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn workspaces(&self) -> &WorkspaceRoot {
        &self.workspaces
    }

    fn broadcast(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Run every stage of `job` in order.
    ///
    /// The workspace is created before the first stage and destroyed after
    /// the terminal notification on every path. Cleanup errors are logged
    /// and never change the returned result.
    pub async fn run(&self, job: Job) -> Result<(), PipelineError> {
        let (job_id, label, stages, notifier) = job.into_parts();
        let progress = Progress::new(job_id, notifier, self.config.progress_interval);

        let workspace = match self.workspaces.create(job_id).await {
            Ok(workspace) => workspace,
            Err(e) => {
                tracing::warn!("Job {} ({}) could not create workspace: {}", job_id, label, e);
                progress.announce(&self.config.failure_message);
                return Err(e.into());
            }
        };

        let ctx = StageContext::new(job_id, workspace.path(), progress.clone());
        let result = self.run_stages(&ctx, &stages).await;

        match &result {
            Ok(()) => {
                tracing::info!("Job {} ({}) finished all {} stages", job_id, label, stages.len());
                progress.announce(&self.config.done_message);
            }
            Err(e) => {
                tracing::warn!("Job {} ({}) failed: {}", job_id, label, e);
                progress.announce(&self.config.failure_message);
            }
        }

        if let Err(e) = workspace.destroy().await {
            tracing::warn!("Failed to remove workspace of job {}: {}", job_id, e);
            self.broadcast(JobEvent::WorkspaceCleanupFailed {
                job_id,
                error: e.to_string(),
                timestamp: Utc::now(),
            });
        }

        result
    }

    async fn run_stages(&self, ctx: &StageContext, stages: &[Stage]) -> Result<(), PipelineError> {
        for (index, stage) in stages.iter().enumerate() {
            ctx.progress().announce(stage.status_text());
            self.broadcast(JobEvent::StageStarted {
                job_id: ctx.job_id(),
                stage: stage.name().to_string(),
                index,
                timestamp: Utc::now(),
            });
            tracing::debug!("Job {} stage {} ({})", ctx.job_id(), index, stage.name());

            if let Err(source) = self.run_stage(stage, ctx.clone()).await {
                return Err(PipelineError::StageFailed {
                    stage: stage.name().to_string(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Run one stage. Errors, panics and timeouts all come back as
    /// `StageError`.
    async fn run_stage(&self, stage: &Stage, ctx: StageContext) -> Result<(), StageError> {
        let step = stage.step();
        let guarded = AssertUnwindSafe(step.run(ctx)).catch_unwind();

        let outcome = match self.config.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| StageError::TimedOut(limit))?,
            None => guarded.await,
        };

        outcome.map_err(|panic| StageError::Panicked(panic_message(panic)))?
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
