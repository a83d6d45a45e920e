//! Supervisor actor owning the queue and its worker.

use std::sync::Arc;

use distort_core::{JobEvent, QueueConfig};
use pipeline::PipelineExecutor;
use ractor::{Actor, ActorCell, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::messages::{QueueMessage, SupervisorMessage, WorkerMessage};
use crate::queue_actor::{QueueActor, QueueArgs};
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// State for the supervisor actor.
pub struct SupervisorState {
    pub queue: ActorRef<QueueMessage>,
    queue_handle: Option<JoinHandle<()>>,
    pub worker: ActorRef<WorkerMessage>,
    worker_handle: Option<JoinHandle<()>>,
    executor: Arc<PipelineExecutor>,
    /// Set once shutdown starts; child exits are expected from then on.
    stopping: bool,
    /// Number of times the worker was replaced.
    pub restarts: u64,
}

/// Supervisor actor arguments.
pub struct SupervisorArgs {
    pub config: QueueConfig,
    pub executor: Arc<PipelineExecutor>,
    pub event_tx: broadcast::Sender<JobEvent>,
}

async fn spawn_worker(
    supervisor: ActorCell,
    queue: ActorRef<QueueMessage>,
    executor: Arc<PipelineExecutor>,
) -> Result<(ActorRef<WorkerMessage>, JoinHandle<()>), ActorProcessingErr> {
    let args = WorkerArgs { queue, executor };
    Actor::spawn_linked(None, WorkerActor, args, supervisor)
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))
}

/// Supervisor actor that keeps one worker attached to the queue.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting job queue supervisor");

        let queue_args = QueueArgs {
            config: args.config,
            event_tx: Some(args.event_tx),
        };
        let (queue, queue_handle) =
            Actor::spawn_linked(None, QueueActor, queue_args, myself.get_cell())
                .await
                .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn queue: {}", e)))?;

        let (worker, worker_handle) =
            spawn_worker(myself.get_cell(), queue.clone(), args.executor.clone()).await?;

        Ok(SupervisorState {
            queue,
            queue_handle: Some(queue_handle),
            worker,
            worker_handle: Some(worker_handle),
            executor: args.executor,
            stopping: false,
            restarts: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::GetQueue { reply } => {
                let _ = reply.send(state.queue.clone());
            }

            SupervisorMessage::GetWorker { reply } => {
                let _ = reply.send(state.worker.clone());
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                state.stopping = true;

                // The worker finishes its current job and reports it before
                // the queue is told to stop.
                state.worker.stop(None);
                if let Some(handle) = state.worker_handle.take() {
                    let _ = handle.await;
                }
                let _ = state.queue.send_message(QueueMessage::Shutdown);
                if let Some(handle) = state.queue_handle.take() {
                    let _ = handle.await;
                }

                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let (cell, reason) = match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                (cell, reason.unwrap_or_else(|| "stopped".to_string()))
            }
            SupervisionEvent::ActorFailed(cell, err) => (cell, err.to_string()),
            _ => return Ok(()),
        };

        if state.stopping {
            return Ok(());
        }

        if cell.get_id() == state.queue.get_id() {
            tracing::error!("Queue actor exited ({}), stopping supervisor", reason);
            state.stopping = true;
            state.worker.stop(None);
            myself.stop(Some(format!("queue actor exited: {}", reason)));
            return Ok(());
        }

        if cell.get_id() != state.worker.get_id() {
            return Ok(());
        }

        tracing::warn!("Worker exited ({}), restarting", reason);
        let (worker, handle) =
            spawn_worker(myself.get_cell(), state.queue.clone(), state.executor.clone()).await?;
        state.worker = worker;
        state.worker_handle = Some(handle);
        state.restarts += 1;
        Ok(())
    }
}
