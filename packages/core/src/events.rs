//! Event types for observers of the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, JobRecord, QueueStats};

/// Events emitted by the job queue for observers (CLI, logs, tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Queue events
    /// The queue's statistics were updated.
    QueueStatsUpdated {
        stats: QueueStats,
        timestamp: DateTime<Utc>,
    },
    /// An admission was refused because the pending sequence is full.
    JobRejected {
        job_id: JobId,
        capacity: usize,
        timestamp: DateTime<Utc>,
    },

    // Job events
    /// A job was accepted into the pending sequence.
    JobAdmitted {
        job: JobRecord,
        position: usize,
        timestamp: DateTime<Utc>,
    },
    /// A job was handed to the worker.
    JobStarted {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// A job entered one of its stages.
    StageStarted {
        job_id: JobId,
        stage: String,
        index: usize,
        timestamp: DateTime<Utc>,
    },
    /// Every stage of a job completed.
    JobSucceeded {
        job_id: JobId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job failed at one of its stages.
    JobFailed {
        job_id: JobId,
        stage: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Removing a job's workspace failed. The job result is unaffected.
    WorkspaceCleanupFailed {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // Worker events
    /// The worker was restarted after dying.
    WorkerRestarted {
        lost_job: Option<JobId>,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobRejected { job_id, .. } => Some(*job_id),
            JobEvent::JobAdmitted { job, .. } => Some(job.id),
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            JobEvent::StageStarted { job_id, .. } => Some(*job_id),
            JobEvent::JobSucceeded { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            JobEvent::WorkspaceCleanupFailed { job_id, .. } => Some(*job_id),
            JobEvent::WorkerRestarted { lost_job, .. } => *lost_job,
            JobEvent::QueueStatsUpdated { .. } => None,
        }
    }

    /// Whether this event ends a job's life in the queue.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::JobSucceeded { .. } | JobEvent::JobFailed { .. } | JobEvent::JobRejected { .. }
        )
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::QueueStatsUpdated { stats, .. } => format!(
                "Queue stats: {} pending, {} running",
                stats.pending, stats.running
            ),
            JobEvent::JobRejected {
                job_id, capacity, ..
            } => format!("Job {} rejected: queue full ({})", job_id, capacity),
            JobEvent::JobAdmitted { job, position, .. } => {
                format!("Job {} admitted at position {}", job.id, position)
            }
            JobEvent::JobStarted { job_id, .. } => format!("Job {} started", job_id),
            JobEvent::StageStarted { job_id, stage, .. } => {
                format!("Job {} -> {}", job_id, stage)
            }
            JobEvent::JobSucceeded {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} succeeded in {}ms", job_id, duration_ms),
            JobEvent::JobFailed {
                job_id,
                stage,
                error,
                ..
            } => format!("Job {} failed at {}: {}", job_id, stage, error),
            JobEvent::WorkspaceCleanupFailed { job_id, error, .. } => {
                format!("Job {} workspace cleanup failed: {}", job_id, error)
            }
            JobEvent::WorkerRestarted { lost_job, .. } => match lost_job {
                Some(job_id) => format!("Worker restarted, job {} lost", job_id),
                None => "Worker restarted".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_and_restart_descriptions() {
        let job_id = JobId::new();
        let failed = JobEvent::JobFailed {
            job_id,
            stage: "distort".to_string(),
            error: "magick exited with 1".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(
            failed.description(),
            format!("Job {} failed at distort: magick exited with 1", job_id)
        );
        assert!(failed.is_terminal());

        let restarted = JobEvent::WorkerRestarted {
            lost_job: None,
            timestamp: Utc::now(),
        };
        assert_eq!(restarted.description(), "Worker restarted");
        assert_eq!(restarted.job_id(), None);
    }
}
