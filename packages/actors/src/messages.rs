//! Message types for actor communication.

use distort_core::{JobId, JobRecord, QueueError, QueuePosition, QueueStats};
use pipeline::Job;
use ractor::{ActorRef, RpcReplyPort};

/// Why a job ended in `failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// Stage the job stopped at.
    pub stage: String,
    /// Raw error text, for operators only.
    pub error: String,
}

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Offer a job. Accepted or rejected atomically with respect to every
    /// other admission.
    Admit {
        job: Box<Job>,
        reply: RpcReplyPort<Result<QueuePosition, QueueError>>,
    },

    /// A worker is ready for jobs. Replaces any previous worker.
    AttachWorker { worker: ActorRef<WorkerMessage> },

    /// The worker finished the job it was handed.
    JobFinished {
        job_id: JobId,
        outcome: Result<(), JobFailure>,
    },

    /// Get a job record by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<JobRecord>>,
    },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Stop the queue. Pending jobs are dropped.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run a job to completion and report back to the queue.
    ProcessJob { job: Box<Job> },

    /// Shutdown the worker.
    Shutdown,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Get the queue actor.
    GetQueue {
        reply: RpcReplyPort<ActorRef<QueueMessage>>,
    },

    /// Get the current worker actor.
    GetWorker {
        reply: RpcReplyPort<ActorRef<WorkerMessage>>,
    },

    /// Stop the worker (after its current job), then the queue, then the
    /// supervisor itself.
    Shutdown,
}

/// Error type for actor operations.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Failed to spawn actor: {0}")]
    Spawn(String),

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Timeout")]
    Timeout,
}
