mod cli;
mod config;

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

use actors::JobQueue;
use anyhow::{Context, bail};
use clap::Parser;
use distort_core::{JobEvent, JobId, JobStatus, QueueConfig, QueueError};
use pipeline::ops::MediaSource;
use pipeline::recipe::{self, Delivery, DirectoryDelivery, MediaKind, Toolkit};
use pipeline::{ExecutorConfig, PipelineExecutor, TracingNotifier};
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use workspace::{WorkspaceConfig, WorkspaceRoot};

use crate::cli::Args;
use crate::config::AppConfig;

#[derive(Debug, Default)]
struct Summary {
    succeeded: usize,
    failed: usize,
    rejected: usize,
    skipped: usize,
}

impl Summary {
    fn all_succeeded(&self) -> bool {
        self.failed + self.rejected + self.skipped == 0
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(args).await {
        Ok(summary) => {
            info!(
                "{} succeeded, {} failed, {} rejected, {} skipped",
                summary.succeeded, summary.failed, summary.rejected, summary.skipped
            );
            if summary.all_succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("Application error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(verbose))
        .init();
}

async fn run(args: Args) -> anyhow::Result<Summary> {
    let config = AppConfig::from_env()
        .and_then(|config| config.with_args(&args))
        .context("invalid configuration")?;
    info!(
        "Workspace root {}, queue capacity {}",
        config.workspace_root.display(),
        config.capacity
    );

    let executor = PipelineExecutor::new(
        WorkspaceRoot::new(WorkspaceConfig::new(&config.workspace_root)),
        ExecutorConfig {
            progress_interval: config.progress_interval,
            stage_timeout: config.stage_timeout,
            ..ExecutorConfig::default()
        },
    );
    let queue = JobQueue::start(QueueConfig::with_capacity(config.capacity), executor)
        .await
        .context("failed to start the job queue")?;
    let mut events = queue.subscribe();

    let toolkit = Arc::new(Toolkit::new(config.tools.clone(), reqwest::Client::new()));
    let delivery: Arc<dyn Delivery> = Arc::new(DirectoryDelivery::new(&args.out));

    let mut summary = Summary::default();
    let mut waiting: HashMap<JobId, String> = HashMap::new();

    for raw in &args.sources {
        let source = MediaSource::parse(raw);
        let Some(kind) = args.kind.or_else(|| infer_kind(&source)) else {
            warn!("{}: cannot tell the media kind from the extension, pass --kind", raw);
            summary.skipped += 1;
            continue;
        };

        let job = recipe::job(kind, source, toolkit.clone(), delivery.clone())
            .notifier(TracingNotifier::labelled(raw.as_str()))
            .build();
        let job_id = job.id();

        match queue.admit(job).await {
            Ok(position) => {
                if !position.starts_immediately() {
                    info!("{}: {} job(s) ahead", raw, position.index);
                }
                waiting.insert(job_id, raw.clone());
            }
            Err(QueueError::CapacityExceeded { .. }) => {
                warn!("{}: rejected, {} jobs already waiting", raw, queue.capacity());
                summary.rejected += 1;
            }
            Err(e) => bail!("failed to admit {}: {}", raw, e),
        }
    }

    while !waiting.is_empty() {
        match events.recv().await {
            Ok(event) => {
                debug!("{}", event.description());
                match event {
                    JobEvent::JobSucceeded { job_id, .. } => {
                        if waiting.remove(&job_id).is_some() {
                            summary.succeeded += 1;
                        }
                    }
                    JobEvent::JobFailed { job_id, .. } => {
                        if let Some(source) = waiting.remove(&job_id) {
                            warn!("{} failed", source);
                            summary.failed += 1;
                        }
                    }
                    JobEvent::WorkspaceCleanupFailed { .. } => {
                        warn!("{}", event.description());
                    }
                    _ => {}
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Missed {} queue events, checking job records", missed);
                resync(&queue, &mut waiting, &mut summary).await?;
            }
            Err(RecvError::Closed) => bail!("job queue stopped unexpectedly"),
        }
    }

    queue.shutdown().await?;
    Ok(summary)
}

fn infer_kind(source: &MediaSource) -> Option<MediaKind> {
    source
        .extension()
        .and_then(|ext| MediaKind::from_extension(&ext))
}

/// Settle jobs whose terminal event was lost to a lagging receiver.
async fn resync(
    queue: &JobQueue,
    waiting: &mut HashMap<JobId, String>,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let ids: Vec<JobId> = waiting.keys().copied().collect();
    for job_id in ids {
        let Some(record) = queue.job(job_id).await? else {
            continue;
        };
        match record.status {
            JobStatus::Succeeded { .. } => summary.succeeded += 1,
            JobStatus::Failed { .. } => summary.failed += 1,
            _ => continue,
        }
        waiting.remove(&job_id);
    }
    Ok(())
}
