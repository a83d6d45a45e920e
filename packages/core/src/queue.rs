//! Queue domain types for the bounded job queue.

use serde::{Deserialize, Serialize};

use crate::JobId;

/// Configuration for queue behavior.
///
/// Capacity is the only tunable: the number of jobs that may wait in the
/// pending sequence. The running job does not count against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of pending jobs.
    pub capacity: usize,
}

impl QueueConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Where an accepted job landed at admission time.
///
/// `index` counts the jobs that will run before this one: the pending jobs
/// ahead of it plus the running job, if any. It is never updated, so a job
/// ahead failing fast makes it an overestimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePosition {
    pub job_id: JobId,
    pub index: usize,
}

impl QueuePosition {
    /// The job starts without waiting for another one.
    pub fn starts_immediately(&self) -> bool {
        self.index == 0
    }
}

/// Admission errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full ({capacity} jobs pending)")]
    CapacityExceeded { capacity: usize },

    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Statistics for a queue's current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    /// Number of pending jobs.
    pub pending: u64,
    /// Number of running jobs (0 or 1).
    pub running: u64,
    /// Number of jobs whose stages all succeeded.
    pub succeeded: u64,
    /// Number of failed jobs.
    pub failed: u64,
    /// Number of admissions rejected for capacity.
    pub rejected: u64,
}

impl QueueStats {
    /// Total jobs in queue (pending + running).
    pub fn active(&self) -> u64 {
        self.pending + self.running
    }

    /// Total processed jobs.
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.processed();
        if total == 0 {
            None
        } else {
            Some((self.succeeded as f64 / total as f64) * 100.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_rates() {
        let stats = QueueStats {
            pending: 2,
            running: 1,
            succeeded: 3,
            failed: 1,
            rejected: 4,
        };
        assert_eq!(stats.active(), 3);
        assert_eq!(stats.processed(), 4);
        assert_eq!(stats.success_rate(), Some(75.0));
        assert_eq!(QueueStats::default().success_rate(), None);
    }

    #[test]
    fn only_index_zero_starts_immediately() {
        let job_id = JobId::new();
        assert!(QueuePosition { job_id, index: 0 }.starts_immediately());
        assert!(!QueuePosition { job_id, index: 1 }.starts_immediately());
    }

    #[test]
    fn config_defaults_missing_fields() {
        let config: QueueConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config, QueueConfig::default());
        assert_eq!(config.capacity, 100);
    }
}
