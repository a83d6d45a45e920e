//! Core domain types for the distortion job queue.
//!
//! This crate contains shared types used across all packages:
//! - JobId, JobStatus and JobRecord for work items
//! - QueueConfig, QueuePosition and QueueStats for the bounded queue
//! - Events and progress updates for observers

mod events;
mod job;
mod progress;
mod queue;

pub use events::JobEvent;
pub use job::{JobId, JobRecord, JobStatus};
pub use progress::ProgressEvent;
pub use queue::{QueueConfig, QueueError, QueuePosition, QueueStats};
