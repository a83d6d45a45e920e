//! Actor system for the job queue.
//!
//! This crate provides the Ractor-based actors that admit jobs into a
//! bounded FIFO and run them one at a time.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor that owns the queue and restarts the worker
//! - `QueueActor` - Owns the pending jobs, enforces capacity, dispatches
//! - `WorkerActor` - Runs one job at a time through the pipeline executor
//! - `JobQueue` - Handle bundling the above for callers
//!
//! # Usage
//!
//! ```ignore
//! use actors::JobQueue;
//!
//! let queue = JobQueue::start(QueueConfig::default(), executor).await?;
//! let mut events = queue.subscribe();
//! let position = queue.admit(job).await?;
//! ```

mod job_queue;
mod messages;
mod queue_actor;
mod supervisor;
mod worker_actor;

pub use job_queue::JobQueue;
pub use messages::{ActorError, JobFailure, QueueMessage, SupervisorMessage, WorkerMessage};
pub use queue_actor::{
    QUEUE_FULL_MESSAGE, QUEUED_MESSAGE, QueueActor, QueueActorState, QueueArgs, WORKER_STAGE, admit,
};
pub use supervisor::{Supervisor, SupervisorArgs, SupervisorState};
pub use worker_actor::{WorkerActor, WorkerActorState, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
