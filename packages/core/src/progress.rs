use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// A user-facing status line for one job. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(job_id: JobId, text: impl Into<String>) -> Self {
        Self {
            job_id,
            text: text.into(),
            at: Utc::now(),
        }
    }
}
