//! Job domain types for work items in the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
///
/// The 80 random bits make identifiers collision resistant, so two jobs
/// never share a workspace even if they were admitted at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue.
    #[default]
    Pending,
    /// Job is currently being executed by the worker.
    Running { started_at: DateTime<Utc> },
    /// Every stage completed.
    Succeeded {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// A stage failed; the remaining stages never ran.
    Failed {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        stage: String,
        error: String,
    },
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. } | JobStatus::Failed { .. })
    }

    /// Name of the stage that failed, if any.
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            JobStatus::Failed { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running { .. } => "running",
            JobStatus::Succeeded { .. } => "succeeded",
            JobStatus::Failed { .. } => "failed",
        }
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            JobStatus::Pending => None,
            JobStatus::Running { started_at }
            | JobStatus::Succeeded { started_at, .. }
            | JobStatus::Failed { started_at, .. } => Some(*started_at),
        }
    }
}

/// Serializable snapshot of a job, kept by the queue for lookups and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Human-readable label (usually the submitted file name).
    pub label: String,
    /// Stage names in execution order.
    pub stages: Vec<String>,
    /// Current status.
    pub status: JobStatus,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a pending record.
    pub fn new(
        id: JobId,
        label: impl Into<String>,
        stages: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            stages,
            status: JobStatus::Pending,
            created_at,
            updated_at: created_at,
        }
    }

    /// Transition into `running`.
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running { started_at: now };
        self.updated_at = now;
    }

    /// Transition into `succeeded`.
    pub fn mark_succeeded(&mut self, now: DateTime<Utc>) {
        let started_at = self.status.started_at().unwrap_or(now);
        self.status = JobStatus::Succeeded {
            started_at,
            finished_at: now,
        };
        self.updated_at = now;
    }

    /// Transition into `failed`.
    pub fn mark_failed(
        &mut self,
        now: DateTime<Utc>,
        stage: impl Into<String>,
        error: impl Into<String>,
    ) {
        let started_at = self.status.started_at().unwrap_or(now);
        self.status = JobStatus::Failed {
            started_at,
            failed_at: now,
            stage: stage.into(),
            error: error.into(),
        };
        self.updated_at = now;
    }

    /// Wall-clock run time, once the job is terminal.
    pub fn duration_ms(&self) -> Option<u64> {
        let (start, end) = match &self.status {
            JobStatus::Succeeded {
                started_at,
                finished_at,
            } => (*started_at, *finished_at),
            JobStatus::Failed {
                started_at,
                failed_at,
                ..
            } => (*started_at, *failed_at),
            _ => return None,
        };
        Some((end - start).num_milliseconds().max(0) as u64)
    }
}
