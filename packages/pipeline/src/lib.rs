//! Staged pipeline execution for distortion jobs.
//!
//! # Architecture
//!
//! - `Stage` - a named step backed by a `StageStep`
//! - `Job` - an ordered list of stages plus the notifier that renders progress
//! - `PipelineExecutor` - runs one job inside its own workspace
//! - `ops` - ffmpeg / ImageMagick / HTTP operations used by stages
//! - `recipe` - stage lists for each supported media kind
//!
//! # Usage
//!
//! ```ignore
//! use pipeline::{ExecutorConfig, Job, PipelineExecutor, Stage};
//!
//! let job = Job::builder("clip.mp4")
//!     .stage(Stage::from_fn("download", |ctx| async move { Ok(()) }))
//!     .build();
//! executor.run(job).await?;
//! ```

mod error;
mod executor;
mod job;
mod notifier;
pub mod ops;
pub mod recipe;
mod stage;

pub use error::{PipelineError, StageError};
pub use executor::{ExecutorConfig, PipelineExecutor};
pub use job::{Job, JobBuilder};
pub use notifier::{ChannelNotifier, NoopNotifier, Notifier, Progress, TracingNotifier};
pub use stage::{Artifacts, FnStep, Stage, StageContext, StageFuture, StageStep};
