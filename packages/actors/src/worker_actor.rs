//! Worker actor for executing jobs.

use std::sync::Arc;

use pipeline::PipelineExecutor;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::{JobFailure, QueueMessage, WorkerMessage};

/// State for the worker actor.
pub struct WorkerActorState {
    /// Queue actor reference.
    pub queue: ActorRef<QueueMessage>,
    pub executor: Arc<PipelineExecutor>,
    /// Jobs run by this worker instance.
    pub processed: u64,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub queue: ActorRef<QueueMessage>,
    pub executor: Arc<PipelineExecutor>,
}

/// Runs one job at a time.
///
/// The worker announces itself to the queue on start and then only ever
/// holds the single job the queue hands it. Each job is reported back with
/// `JobFinished` before the next one can arrive.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker");
        Ok(WorkerActorState {
            queue: args.queue,
            executor: args.executor,
            processed: 0,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state
            .queue
            .send_message(QueueMessage::AttachWorker { worker: myself })?;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::ProcessJob { job } => {
                let job_id = job.id();
                tracing::debug!("Worker picked up job {} ({})", job_id, job.label());

                let outcome = state.executor.run(*job).await.map_err(|e| JobFailure {
                    stage: e.failed_stage().to_string(),
                    error: e.to_string(),
                });
                state.processed += 1;

                state
                    .queue
                    .send_message(QueueMessage::JobFinished { job_id, outcome })?;
            }

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker after {} jobs", state.processed);
                myself.stop(None);
            }
        }

        Ok(())
    }
}
