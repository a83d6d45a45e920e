//! Executable jobs.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use distort_core::{JobId, JobRecord};

use crate::notifier::{NoopNotifier, Notifier};
use crate::stage::Stage;

/// A unit of work: an ordered list of stages and where to send progress.
///
/// The identifier is assigned when the job is built, so it can key the
/// workspace and every event before the job is admitted.
pub struct Job {
    id: JobId,
    label: String,
    created_at: DateTime<Utc>,
    stages: Vec<Stage>,
    notifier: Arc<dyn Notifier>,
}

impl Job {
    pub fn builder(label: impl Into<String>) -> JobBuilder {
        JobBuilder {
            label: label.into(),
            stages: Vec::new(),
            notifier: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    /// Send a status line for this job outside of any stage, e.g. "Queued...".
    pub fn notify(&self, text: &str) {
        self.notifier.notify(self.id, text);
    }

    /// Pending snapshot used by the queue.
    pub fn record(&self) -> JobRecord {
        JobRecord::new(self.id, &self.label, self.stage_names(), self.created_at)
    }

    pub(crate) fn into_parts(self) -> (JobId, String, Vec<Stage>, Arc<dyn Notifier>) {
        (self.id, self.label, self.stages, self.notifier)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("created_at", &self.created_at)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Job`].
pub struct JobBuilder {
    label: String,
    stages: Vec<Stage>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl JobBuilder {
    /// Append a stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append several stages in order.
    pub fn stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.stages.extend(stages);
        self
    }

    pub fn notifier(mut self, notifier: impl Notifier) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    pub fn build(self) -> Job {
        Job {
            id: JobId::new(),
            label: self.label,
            created_at: Utc::now(),
            stages: self.stages,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(NoopNotifier)),
        }
    }
}
