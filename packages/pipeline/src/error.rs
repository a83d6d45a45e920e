use std::time::Duration;

use workspace::WorkspaceError;

use crate::ops::OperationError;

/// Why a single stage failed.
///
/// Every variant is treated the same by the executor: the job stops and is
/// marked failed at this stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("missing artifact: {0}")]
    MissingArtifact(String),

    #[error("invalid artifact {key}: {source}")]
    InvalidArtifact {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl StageError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Terminal failure of a job run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("workspace setup failed: {0}")]
    Workspace(#[from] WorkspaceError),
}

impl PipelineError {
    /// Name of the stage the job stopped at. Workspace setup happens before
    /// any stage and is reported as `workspace`.
    pub fn failed_stage(&self) -> &str {
        match self {
            PipelineError::StageFailed { stage, .. } => stage,
            PipelineError::Workspace(_) => "workspace",
        }
    }
}
