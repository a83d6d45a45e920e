//! Queue actor owning the pending sequence.
//!
//! Every admission, dispatch and completion goes through this actor's
//! mailbox, so the capacity check and the append happen as one step and
//! exactly one job is ever handed to the worker at a time.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use distort_core::{
    JobEvent, JobId, JobRecord, QueueConfig, QueueError, QueuePosition, QueueStats,
};
use pipeline::Job;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef, MessagingErr};
use tokio::sync::broadcast;

use crate::messages::{JobFailure, QueueMessage, WorkerMessage};

/// Terminal job records kept for lookups before the oldest are dropped.
const FINISHED_HISTORY: usize = 1024;

/// Stage reported for a job lost because its worker died.
pub const WORKER_STAGE: &str = "worker";

/// Sent to a job admitted behind other work.
pub const QUEUED_MESSAGE: &str = "Queued...";

/// Sent to a job turned away at admission.
pub const QUEUE_FULL_MESSAGE: &str = "Sorry, the queue is full. Please try again later!";

/// State for the queue actor.
pub struct QueueActorState {
    config: QueueConfig,
    /// Admitted jobs not yet handed to the worker, oldest first.
    pending: VecDeque<Job>,
    /// The job the worker is running.
    running: Option<JobId>,
    worker: Option<ActorRef<WorkerMessage>>,
    /// Records of pending, running and recently finished jobs.
    jobs: HashMap<JobId, JobRecord>,
    finished: VecDeque<JobId>,
    stats: QueueStats,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl QueueActorState {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            running: None,
            worker: None,
            jobs: HashMap::new(),
            finished: VecDeque::new(),
            stats: QueueStats::default(),
            event_tx: None,
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn broadcast(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Update and broadcast stats.
    fn update_stats(&mut self) {
        self.stats.pending = self.pending.len() as u64;
        self.stats.running = u64::from(self.running.is_some());

        self.broadcast(JobEvent::QueueStatsUpdated {
            stats: self.stats.clone(),
            timestamp: Utc::now(),
        });
    }

    fn admit(&mut self, job: Job) -> Result<QueuePosition, QueueError> {
        let job_id = job.id();
        let capacity = self.config.capacity;

        if self.pending.len() >= capacity {
            tracing::info!("Rejected job {} ({}): queue is full", job_id, job.label());
            job.notify(QUEUE_FULL_MESSAGE);
            self.stats.rejected += 1;
            self.broadcast(JobEvent::JobRejected {
                job_id,
                capacity,
                timestamp: Utc::now(),
            });
            self.update_stats();
            return Err(QueueError::CapacityExceeded { capacity });
        }

        let index = self.pending.len() + usize::from(self.running.is_some());
        if index > 0 {
            // Sent before the job can be dispatched, so it always precedes
            // the first stage update.
            job.notify(QUEUED_MESSAGE);
        }
        let record = job.record();
        self.jobs.insert(job_id, record.clone());
        self.pending.push_back(job);

        tracing::info!("Admitted job {} ({}) at position {}", job_id, record.label, index);
        self.broadcast(JobEvent::JobAdmitted {
            job: record,
            position: index,
            timestamp: Utc::now(),
        });
        self.update_stats();

        Ok(QueuePosition { job_id, index })
    }

    /// Hand the oldest pending job to the worker if it is idle.
    fn dispatch(&mut self) {
        if self.running.is_some() {
            return;
        }
        let Some(worker) = self.worker.clone() else {
            return;
        };
        let Some(job) = self.pending.pop_front() else {
            return;
        };

        let job_id = job.id();
        match worker.send_message(WorkerMessage::ProcessJob { job: Box::new(job) }) {
            Ok(()) => {
                let now = Utc::now();
                if let Some(record) = self.jobs.get_mut(&job_id) {
                    record.mark_running(now);
                }
                self.running = Some(job_id);

                tracing::info!("Started job {}", job_id);
                self.broadcast(JobEvent::JobStarted {
                    job_id,
                    timestamp: now,
                });
                self.update_stats();
            }
            Err(MessagingErr::SendErr(WorkerMessage::ProcessJob { job })) => {
                tracing::warn!("Worker is gone, job {} stays first in line", job_id);
                self.pending.push_front(*job);
                self.worker = None;
            }
            Err(e) => {
                tracing::warn!("Worker is gone, job {} was lost: {}", job_id, e);
                self.worker = None;
                self.running = Some(job_id);
                self.finish(job_id, Err(lost_to_worker()));
            }
        }
    }

    /// Record the outcome of the running job.
    fn finish(&mut self, job_id: JobId, outcome: Result<(), JobFailure>) {
        if self.running != Some(job_id) {
            tracing::warn!("Ignoring completion of job {} which is not running", job_id);
            return;
        }
        self.running = None;

        let now = Utc::now();
        let record = self.jobs.get_mut(&job_id);
        match outcome {
            Ok(()) => {
                let duration_ms = record
                    .map(|r| {
                        r.mark_succeeded(now);
                        r.duration_ms().unwrap_or_default()
                    })
                    .unwrap_or_default();
                self.stats.succeeded += 1;

                tracing::info!("Job {} succeeded in {}ms", job_id, duration_ms);
                self.broadcast(JobEvent::JobSucceeded {
                    job_id,
                    duration_ms,
                    timestamp: now,
                });
            }
            Err(JobFailure { stage, error }) => {
                if let Some(r) = record {
                    r.mark_failed(now, &stage, &error);
                }
                self.stats.failed += 1;

                tracing::warn!("Job {} failed at stage {}: {}", job_id, stage, error);
                self.broadcast(JobEvent::JobFailed {
                    job_id,
                    stage,
                    error,
                    timestamp: now,
                });
            }
        }

        self.finished.push_back(job_id);
        while self.finished.len() > FINISHED_HISTORY {
            if let Some(old) = self.finished.pop_front() {
                self.jobs.remove(&old);
            }
        }
        self.update_stats();
    }

    /// Install a new worker. A job still marked running belonged to a
    /// worker that died, so it fails.
    fn attach(&mut self, worker: ActorRef<WorkerMessage>) {
        let replaced = self.worker.replace(worker).is_some();
        let lost_job = self.running;
        if let Some(job_id) = lost_job {
            self.finish(job_id, Err(lost_to_worker()));
        }

        if replaced || lost_job.is_some() {
            tracing::warn!("Worker restarted (lost job: {:?})", lost_job);
            self.broadcast(JobEvent::WorkerRestarted {
                lost_job,
                timestamp: Utc::now(),
            });
        } else {
            tracing::info!("Worker attached");
        }
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn lost_to_worker() -> JobFailure {
    JobFailure {
        stage: WORKER_STAGE.to_string(),
        error: "worker stopped before the job finished".to_string(),
    }
}

/// Queue actor arguments.
pub struct QueueArgs {
    pub config: QueueConfig,
    pub event_tx: Option<broadcast::Sender<JobEvent>>,
}

/// Queue actor that owns the pending jobs.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue actor (capacity {})", args.config.capacity);
        let mut state = QueueActorState::new(args.config);
        if let Some(tx) = args.event_tx {
            state = state.with_event_tx(tx);
        }
        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Admit { job, reply } => {
                let result = state.admit(*job);
                let _ = reply.send(result);
                state.dispatch();
            }

            QueueMessage::AttachWorker { worker } => {
                state.attach(worker);
                state.dispatch();
            }

            QueueMessage::JobFinished { job_id, outcome } => {
                state.finish(job_id, outcome);
                state.dispatch();
            }

            QueueMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.jobs.get(&job_id).cloned());
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats.clone());
            }

            QueueMessage::Shutdown => {
                tracing::info!(
                    "Shutting down queue ({} pending jobs dropped)",
                    state.pending.len()
                );
                myself.stop(None);
            }
        }

        Ok(())
    }
}

/// Offer `job` to a queue actor.
///
/// `Ok` carries the position the job was admitted at; a full queue is
/// `QueueError::CapacityExceeded` and the job is dropped.
pub async fn admit(queue: &ActorRef<QueueMessage>, job: Job) -> Result<QueuePosition, QueueError> {
    let result = ractor::rpc::call(
        queue,
        |reply| QueueMessage::Admit {
            job: Box::new(job),
            reply,
        },
        None,
    )
    .await;

    match result {
        Ok(CallResult::Success(admission)) => admission,
        Ok(CallResult::Timeout) => Err(QueueError::Unavailable("admission timed out".into())),
        Ok(CallResult::SenderError) => Err(QueueError::Unavailable(
            "queue dropped the admission".into(),
        )),
        Err(e) => Err(QueueError::Unavailable(e.to_string())),
    }
}
