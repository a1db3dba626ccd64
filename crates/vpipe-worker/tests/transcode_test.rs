//! Transcoding state machine tests.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{formats, Harness, Step};
use vpipe_models::{NewVideo, ProcessingStatus, VideoId};
use vpipe_queue::TranscodeMode;
use vpipe_store::{FormatRepo, ProcessingRepo, VideoRepo};
use vpipe_worker::lock::transcode_lock;
use vpipe_worker::transcode::NO_JOBS_MESSAGE;
use vpipe_worker::{LockManager, ResponseCache, TranscodeOutcome, WorkerError};

async fn create_video(h: &Harness, id: &str) -> VideoId {
    let video_id = VideoId::from(id);
    h.store
        .create_video(&NewVideo::new(video_id.clone(), "u1", "clip.mp4"), Utc::now())
        .await
        .unwrap();
    video_id
}

#[tokio::test]
async fn test_successful_run_replaces_formats() {
    let h = Harness::new();
    let id = create_video(&h, "vid001").await;

    // Formats of a previous attempt
    h.store
        .create_format(&id, &vpipe_models::FormatInfo::new("OLD", 100.0))
        .await
        .unwrap();

    h.backend.script(
        "vid001",
        vec![
            vec![Step::Progress(50.0), Step::Done],
            vec![Step::Progress(20.0), Step::Progress(80.0), Step::Done],
            vec![Step::Done],
        ],
    );
    h.backend.set_formats(
        "vid001",
        formats(&[("LD", 500.0), ("SD", 1000.0), ("HD", 4000.0)]),
    );

    let outcome = h.ctx.transcoder().run(&id, TranscodeMode::Full).await.unwrap();
    assert_eq!(outcome, TranscodeOutcome::Succeeded { formats: 3 });

    let state = h.store.get_processing_state(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ProcessingStatus::Success);
    assert_eq!(state.progress, 100.0);
    assert!(state.message.is_empty());

    let names: Vec<String> = h
        .store
        .list_formats(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["LD", "SD", "HD"]);
    assert!(h.backend.deleted_videos().is_empty());
}

#[tokio::test]
async fn test_failed_job_fails_video_and_wipes_assets() {
    let h = Harness::new();
    let id = create_video(&h, "vid002").await;
    h.store
        .create_format(&id, &vpipe_models::FormatInfo::new("OLD", 100.0))
        .await
        .unwrap();

    h.backend.script(
        "vid002",
        vec![
            vec![Step::Progress(10.0), Step::Done],
            vec![Step::Progress(30.0), Step::Fail("codec error".to_string())],
            vec![Step::Done],
        ],
    );
    h.backend.set_formats("vid002", formats(&[("HD", 4000.0)]));

    let outcome = h.ctx.transcoder().run(&id, TranscodeMode::Full).await.unwrap();
    assert_eq!(
        outcome,
        TranscodeOutcome::Failed {
            message: "codec error".to_string()
        }
    );

    let state = h.store.get_processing_state(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ProcessingStatus::Failed);
    assert_eq!(state.message, "codec error");
    assert!(h.store.list_formats(&id).await.unwrap().is_empty());
    assert_eq!(h.backend.deleted_videos(), vec![id]);
}

#[tokio::test]
async fn test_failed_video_asset_deletion_is_retried() {
    let h = Harness::new();
    let id = create_video(&h, "vid012").await;
    h.backend.script(
        "vid012",
        vec![vec![Step::Done], vec![Step::Fail("codec error".to_string())]],
    );
    h.backend.fail_deletes(1);

    let outcome = h.ctx.transcoder().run(&id, TranscodeMode::Full).await.unwrap();
    assert_eq!(
        outcome,
        TranscodeOutcome::Failed {
            message: "codec error".to_string()
        }
    );
    assert_eq!(h.backend.deleted_videos(), vec![id]);
}

#[tokio::test]
async fn test_failed_video_asset_deletion_error_is_returned() {
    let h = Harness::new();
    let id = create_video(&h, "vid013").await;
    h.store
        .create_format(&id, &vpipe_models::FormatInfo::new("OLD", 100.0))
        .await
        .unwrap();
    h.backend.script(
        "vid013",
        vec![vec![Step::Done], vec![Step::Fail("codec error".to_string())]],
    );
    h.backend.fail_deletes(10);

    let result = h.ctx.transcoder().run(&id, TranscodeMode::Full).await;
    assert!(matches!(result, Err(WorkerError::Backend(_))));
    assert!(h.backend.deleted_videos().is_empty());

    // The job failure stays the recorded reason
    let state = h.store.get_processing_state(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ProcessingStatus::Failed);
    assert_eq!(state.message, "codec error");
    assert!(h.store.list_formats(&id).await.unwrap().is_empty());
    assert!(!h.locks.is_held(&transcode_lock(&id)).await.unwrap());
}

#[tokio::test]
async fn test_failure_messages_are_joined() {
    let h = Harness::new();
    let id = create_video(&h, "vid003").await;
    h.backend.script(
        "vid003",
        vec![
            vec![Step::Fail("audio track missing".to_string())],
            vec![Step::Fail("codec error".to_string())],
        ],
    );

    let outcome = h.ctx.transcoder().run(&id, TranscodeMode::Full).await.unwrap();
    assert_eq!(
        outcome,
        TranscodeOutcome::Failed {
            message: "audio track missing\ncodec error".to_string()
        }
    );
}

#[tokio::test]
async fn test_progress_never_decreases() {
    let h = Harness::new();
    h.backend.observe(h.store.clone());
    let id = create_video(&h, "vid004").await;

    h.backend.script(
        "vid004",
        vec![
            vec![
                Step::Progress(10.0),
                Step::Progress(60.0),
                Step::Progress(30.0),
                Step::Done,
            ],
            vec![Step::Progress(40.0), Step::Progress(20.0), Step::Done],
        ],
    );

    h.ctx.transcoder().run(&id, TranscodeMode::Full).await.unwrap();

    let snapshots = h.backend.progress_snapshots();
    assert!(!snapshots.is_empty());
    assert!(
        snapshots.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        snapshots
    );

    let state = h.store.get_processing_state(&id).await.unwrap().unwrap();
    assert_eq!(state.progress, 100.0);
}

#[tokio::test]
async fn test_concurrent_run_is_skipped() {
    let h = Harness::new();
    let id = create_video(&h, "vid005").await;
    h.backend.script(
        "vid005",
        vec![vec![
            Step::Progress(10.0),
            Step::Progress(20.0),
            Step::Progress(30.0),
            Step::Progress(40.0),
            Step::Progress(50.0),
            Step::Done,
        ]],
    );
    h.backend.set_formats("vid005", formats(&[("HD", 4000.0)]));

    let ctx = h.ctx.clone();
    let first_id = id.clone();
    let first = tokio::spawn(async move { ctx.transcoder().run(&first_id, TranscodeMode::Full).await });

    while h.backend.start_calls("vid005") == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let second = h.ctx.transcoder().run(&id, TranscodeMode::Full).await.unwrap();
    assert_eq!(second, TranscodeOutcome::Skipped);
    assert_eq!(h.backend.start_calls("vid005"), 1);

    let first = first.await.unwrap().unwrap();
    assert_eq!(first, TranscodeOutcome::Succeeded { formats: 1 });
    assert_eq!(h.store.list_formats(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_jobs_fails_video() {
    let h = Harness::new();
    let id = create_video(&h, "vid006").await;

    let result = h.ctx.transcoder().run(&id, TranscodeMode::Full).await;
    assert!(matches!(result, Err(WorkerError::JobFailed(_))));

    let state = h.store.get_processing_state(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ProcessingStatus::Failed);
    assert!(state.message.contains(NO_JOBS_MESSAGE));
}

#[tokio::test]
async fn test_provider_error_is_recorded_and_lock_released() {
    let h = Harness::new();
    let id = create_video(&h, "vid007").await;
    h.store
        .create_format(&id, &vpipe_models::FormatInfo::new("OLD", 100.0))
        .await
        .unwrap();
    h.backend.script(
        "vid007",
        vec![vec![Step::Progress(10.0), Step::Error("connection reset".to_string())]],
    );

    let result = h.ctx.transcoder().run(&id, TranscodeMode::Full).await;
    assert!(matches!(result, Err(WorkerError::Backend(_))));

    let state = h.store.get_processing_state(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ProcessingStatus::Failed);
    assert_eq!(state.message, "connection reset");
    assert!(h.store.list_formats(&id).await.unwrap().is_empty());
    assert!(!h.locks.is_held(&transcode_lock(&id)).await.unwrap());
}

#[tokio::test]
async fn test_missing_video_is_not_found() {
    let h = Harness::new();
    let result = h
        .ctx
        .transcoder()
        .run(&VideoId::from("nope"), TranscodeMode::Full)
        .await;
    assert!(matches!(result, Err(WorkerError::NotFound(_))));
}

#[tokio::test]
async fn test_additional_run_keeps_existing_formats() {
    let h = Harness::new();
    let id = create_video(&h, "vid008").await;
    h.store
        .create_format(&id, &vpipe_models::FormatInfo::new("HD", 4000.0))
        .await
        .unwrap();

    h.backend
        .script_additional("vid008", vec![vec![Step::Progress(50.0), Step::Done]]);
    h.backend
        .set_additional_formats("vid008", formats(&[("UHD", 12000.0)]));

    let outcome = h
        .ctx
        .transcoder()
        .run(&id, TranscodeMode::Additional)
        .await
        .unwrap();
    assert_eq!(outcome, TranscodeOutcome::Succeeded { formats: 1 });

    let names: Vec<String> = h
        .store
        .list_formats(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["HD", "UHD"]);
}

#[tokio::test]
async fn test_additional_failure_keeps_assets() {
    let h = Harness::new();
    let id = create_video(&h, "vid009").await;
    h.store
        .create_format(&id, &vpipe_models::FormatInfo::new("HD", 4000.0))
        .await
        .unwrap();
    h.backend
        .script_additional("vid009", vec![vec![Step::Fail("bad preset".to_string())]]);

    let outcome = h
        .ctx
        .transcoder()
        .run(&id, TranscodeMode::Additional)
        .await
        .unwrap();
    assert!(matches!(outcome, TranscodeOutcome::Failed { .. }));
    assert_eq!(h.store.list_formats(&id).await.unwrap().len(), 1);
    assert!(h.backend.deleted_videos().is_empty());
}

#[tokio::test]
async fn test_run_invalidates_cached_view() {
    let h = Harness::new();
    let id = create_video(&h, "vid010").await;
    h.backend.script("vid010", vec![vec![Step::Done]]);
    h.backend.set_formats("vid010", formats(&[("SD", 1000.0)]));

    let before = h.ctx.views().get_view(&id).await.unwrap().unwrap();
    assert!(before.formats.is_empty());
    assert!(h.cache.get(&id).await.is_some());

    h.ctx.transcoder().run(&id, TranscodeMode::Full).await.unwrap();
    assert!(h.cache.get(&id).await.is_none());

    let after = h.ctx.views().get_view(&id).await.unwrap().unwrap();
    assert_eq!(after.formats.len(), 1);
    assert_eq!(
        after.processing.map(|p| p.status),
        Some(ProcessingStatus::Success)
    );
}
