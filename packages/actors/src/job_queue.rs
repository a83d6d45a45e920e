//! Handle for the running queue.

use std::sync::Arc;

use distort_core::{JobEvent, JobId, JobRecord, QueueConfig, QueueError, QueuePosition, QueueStats};
use pipeline::{Job, PipelineExecutor};
use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::messages::{ActorError, QueueMessage, SupervisorMessage, WorkerMessage};
use crate::queue_actor;
use crate::supervisor::{Supervisor, SupervisorArgs};

/// Events buffered per subscriber before the slowest one starts lagging.
const EVENT_BUFFER: usize = 1024;

/// A bounded FIFO queue with one sequential worker.
///
/// ```ignore
/// let queue = JobQueue::start(QueueConfig::default(), executor).await?;
/// match queue.admit(job).await {
///     Ok(position) if position.index > 0 => println!("Queued..."),
///     Ok(_) => {}
///     Err(QueueError::CapacityExceeded { .. }) => println!("Sorry, the queue is full."),
///     Err(e) => return Err(e.into()),
/// }
/// ```
pub struct JobQueue {
    supervisor: ActorRef<SupervisorMessage>,
    supervisor_handle: JoinHandle<()>,
    queue: ActorRef<QueueMessage>,
    event_tx: broadcast::Sender<JobEvent>,
    capacity: usize,
}

impl JobQueue {
    /// Spawn the supervisor, the queue actor and the worker.
    ///
    /// Stage events from the executor are published on the same channel as
    /// queue events.
    pub async fn start(config: QueueConfig, executor: PipelineExecutor) -> Result<Self, ActorError> {
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let capacity = config.capacity;
        let args = SupervisorArgs {
            config,
            executor: Arc::new(executor.with_event_tx(event_tx.clone())),
            event_tx: event_tx.clone(),
        };

        let (supervisor, supervisor_handle) = Actor::spawn(None, Supervisor, args)
            .await
            .map_err(|e| ActorError::Spawn(e.to_string()))?;

        let queue = call(&supervisor, |reply| SupervisorMessage::GetQueue { reply }).await?;

        Ok(Self {
            supervisor,
            supervisor_handle,
            queue,
            event_tx,
            capacity,
        })
    }

    /// Offer a job. See [`queue_actor::admit`].
    pub async fn admit(&self, job: Job) -> Result<QueuePosition, QueueError> {
        queue_actor::admit(&self.queue, job).await
    }

    pub async fn stats(&self) -> Result<QueueStats, ActorError> {
        call(&self.queue, |reply| QueueMessage::GetStats { reply }).await
    }

    /// Record of a pending, running or recently finished job.
    pub async fn job(&self, job_id: JobId) -> Result<Option<JobRecord>, ActorError> {
        call(&self.queue, |reply| QueueMessage::GetJob { job_id, reply }).await
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn queue_ref(&self) -> ActorRef<QueueMessage> {
        self.queue.clone()
    }

    /// The worker currently attached. Changes when the worker is restarted.
    pub async fn worker_ref(&self) -> Result<ActorRef<WorkerMessage>, ActorError> {
        call(&self.supervisor, |reply| SupervisorMessage::GetWorker { reply }).await
    }

    /// Let the running job finish, drop pending jobs and stop every actor.
    pub async fn shutdown(self) -> Result<(), ActorError> {
        self.supervisor
            .send_message(SupervisorMessage::Shutdown)
            .map_err(|e| ActorError::Actor(e.to_string()))?;
        self.supervisor_handle
            .await
            .map_err(|e| ActorError::Actor(e.to_string()))
    }
}

async fn call<M, T, F>(actor: &ActorRef<M>, build: F) -> Result<T, ActorError>
where
    M: ractor::Message,
    T: Send + 'static,
    F: FnOnce(ractor::RpcReplyPort<T>) -> M,
{
    match ractor::rpc::call(actor, build, None).await {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(ActorError::Timeout),
        Ok(CallResult::SenderError) => Err(ActorError::Actor("reply dropped".into())),
        Err(e) => Err(ActorError::Actor(e.to_string())),
    }
}
