#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Recorder, executor, failing_stage, recording_stage};
use distort_core::JobEvent;
use pipeline::{ExecutorConfig, Job, PipelineError, Stage, StageError};
use tokio::sync::broadcast;

const FAILURE: &str = "Sorry, something went wrong. Please try another file!";

#[tokio::test]
async fn test_stages_run_in_order_and_workspace_is_removed() -> Result<(), Box<dyn Error>> {
    let (_dir, executor) = executor(ExecutorConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    let recorder = Recorder::default();

    let job = Job::builder("clip.mp4")
        .stage(recording_stage("stage_1", log.clone()))
        .stage(recording_stage("stage_2", log.clone()))
        .stage(recording_stage("stage_3", log.clone()))
        .notifier(recorder.clone())
        .build();
    let workspace = executor.workspaces().path_for(job.id());

    executor.run(job).await?;

    assert_eq!(*log.lock().unwrap(), vec!["stage_1", "stage_2", "stage_3"]);
    assert_eq!(
        recorder.texts(),
        vec![
            "Running stage_1...",
            "Running stage_2...",
            "Running stage_3...",
            "Done!",
        ]
    );
    assert!(!workspace.exists());
    Ok(())
}

#[tokio::test]
async fn test_failing_stage_stops_the_job() -> Result<(), Box<dyn Error>> {
    let (_dir, executor) = executor(ExecutorConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    let recorder = Recorder::default();

    let job = Job::builder("voice.ogg")
        .stage(recording_stage("stage_1", log.clone()))
        .stage(failing_stage("stage_2"))
        .stage(recording_stage("stage_3", log.clone()))
        .notifier(recorder.clone())
        .build();
    let workspace = executor.workspaces().path_for(job.id());

    let err = executor.run(job).await.unwrap_err();

    assert_eq!(err.failed_stage(), "stage_2");
    assert!(matches!(
        err,
        PipelineError::StageFailed {
            source: StageError::Other(_),
            ..
        }
    ));
    assert_eq!(*log.lock().unwrap(), vec!["stage_1"]);
    assert_eq!(recorder.texts().last().map(String::as_str), Some(FAILURE));
    assert!(!workspace.exists());
    Ok(())
}

#[tokio::test]
async fn test_panicking_stage_is_a_failure() -> Result<(), Box<dyn Error>> {
    let (_dir, executor) = executor(ExecutorConfig::default());

    let job = Job::builder("sticker.webp")
        .stage(Stage::from_fn("distort", |_ctx| async {
            if true {
                panic!("liquid rescale exploded");
            }
            Ok(())
        }))
        .build();
    let workspace = executor.workspaces().path_for(job.id());

    let err = executor.run(job).await.unwrap_err();

    assert_eq!(err.failed_stage(), "distort");
    match err {
        PipelineError::StageFailed {
            source: StageError::Panicked(message),
            ..
        } => assert_eq!(message, "liquid rescale exploded"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!workspace.exists());

    // The executor is reusable after a panic.
    let next = Job::builder("next.webp")
        .stage(Stage::from_fn("noop", |_ctx| async { Ok(()) }))
        .build();
    executor.run(next).await?;
    Ok(())
}

#[tokio::test]
async fn test_stage_timeout() -> Result<(), Box<dyn Error>> {
    let config = ExecutorConfig {
        stage_timeout: Some(Duration::from_millis(50)),
        ..ExecutorConfig::default()
    };
    let (_dir, executor) = executor(config);

    let job = Job::builder("slow.mp4")
        .stage(Stage::from_fn("extract", |_ctx| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }))
        .build();
    let workspace = executor.workspaces().path_for(job.id());

    let err = executor.run(job).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::StageFailed {
            source: StageError::TimedOut(limit),
            ..
        } if limit == Duration::from_millis(50)
    ));
    assert!(!workspace.exists());
    Ok(())
}

#[tokio::test]
async fn test_artifacts_flow_between_stages() -> Result<(), Box<dyn Error>> {
    let (_dir, executor) = executor(ExecutorConfig::default());
    let seen = Arc::new(Mutex::new(None));
    let seen_in_stage = seen.clone();

    let job = Job::builder("photo.jpeg")
        .stage(Stage::from_fn("verify", |ctx| async move {
            ctx.put_value("dimensions", &(1280u32, 720u32)).await
        }))
        .stage(Stage::from_fn("distort", move |ctx| {
            let seen = seen_in_stage.clone();
            async move {
                let dimensions: (u32, u32) = ctx.value("dimensions").await?;
                *seen.lock().unwrap() = Some(dimensions);
                Ok(())
            }
        }))
        .build();

    executor.run(job).await?;

    assert_eq!(*seen.lock().unwrap(), Some((1280, 720)));
    Ok(())
}

#[tokio::test]
async fn test_stage_events_are_broadcast() -> Result<(), Box<dyn Error>> {
    let (_dir, executor) = executor(ExecutorConfig::default());
    let (tx, mut rx) = broadcast::channel(16);
    let executor = executor.with_event_tx(tx);

    let job = Job::builder("song.mp3")
        .stage(Stage::from_fn("download", |_ctx| async { Ok(()) }))
        .stage(Stage::from_fn("verify", |_ctx| async { Ok(()) }))
        .build();
    let job_id = job.id();

    executor.run(job).await?;

    let mut stages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let JobEvent::StageStarted {
            job_id: id,
            stage,
            index,
            ..
        } = event
        {
            assert_eq!(id, job_id);
            stages.push((index, stage));
        }
    }
    assert_eq!(
        stages,
        vec![(0, "download".to_string()), (1, "verify".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_workspace_setup_failure() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    // A regular file where the root directory should be.
    let root = dir.path().join("operations");
    tokio::fs::write(&root, b"").await?;
    let executor = pipeline::PipelineExecutor::new(
        workspace::WorkspaceRoot::new(workspace::WorkspaceConfig::new(&root)),
        ExecutorConfig::default(),
    );
    let recorder = Recorder::default();
    let ran = Arc::new(Mutex::new(Vec::new()));

    let job = Job::builder("clip.mp4")
        .stage(recording_stage("download", ran.clone()))
        .notifier(recorder.clone())
        .build();

    let err = executor.run(job).await.unwrap_err();

    assert!(matches!(err, PipelineError::Workspace(_)));
    assert_eq!(err.failed_stage(), "workspace");
    assert!(ran.lock().unwrap().is_empty());
    assert_eq!(recorder.texts(), vec![FAILURE]);
    Ok(())
}

#[tokio::test]
async fn test_cleanup_failure_keeps_the_job_result() -> Result<(), Box<dyn Error>> {
    let (_dir, executor) = executor(ExecutorConfig::default());
    let (tx, mut rx) = broadcast::channel(16);
    let executor = executor.with_event_tx(tx);
    let recorder = Recorder::default();

    // Swap the workspace directory for a plain file so removal fails.
    let job = Job::builder("photo.jpg")
        .stage(Stage::from_fn("distort", |ctx| async move {
            tokio::fs::remove_dir_all(ctx.dir()).await?;
            tokio::fs::write(ctx.dir(), b"not a directory").await?;
            Ok(())
        }))
        .notifier(recorder.clone())
        .build();
    let job_id = job.id();
    let workspace = executor.workspaces().path_for(job_id);

    executor.run(job).await?;

    assert_eq!(recorder.texts().last().map(String::as_str), Some("Done!"));
    assert!(workspace.is_file());

    let mut cleanup_failed = false;
    while let Ok(event) = rx.try_recv() {
        if let JobEvent::WorkspaceCleanupFailed { job_id: id, .. } = event {
            assert_eq!(id, job_id);
            cleanup_failed = true;
        }
    }
    assert!(cleanup_failed);
    Ok(())
}
