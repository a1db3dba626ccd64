//! Upload detection tests.

mod common;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use common::Harness;
use vpipe_models::{Playlist, UploadGrant, UploadMethod, VideoId, VideoUploadUrl};
use vpipe_queue::{MonitorUploadJob, QueueJob};
use vpipe_store::{PlaylistRepo, UploadUrlRepo, VideoRepo};
use vpipe_worker::lock::monitor_upload_lock;
use vpipe_worker::{process_task, LockManager, UploadCheckOutcome, WorkerError};

async fn issue(h: &Harness, filename: &str) -> VideoId {
    h.ctx
        .upload_monitor()
        .issue_upload_grant("u1", filename, None, None)
        .await
        .unwrap()
        .id
}

async fn insert_url(h: &Harness, id: &str, expires_in: ChronoDuration) -> VideoId {
    let grant = UploadGrant {
        id: VideoId::from(id),
        url: format!("https://uploads.example.com/{}", id),
        method: UploadMethod::Put,
        expires_at: Utc::now() + expires_in,
    };
    let url = VideoUploadUrl::from_grant(&grant, "clip.mp4", "u1", Utc::now());
    h.store.create_upload_url(&url).await.unwrap();
    grant.id
}

#[tokio::test]
async fn test_detected_upload_creates_video_once() {
    let h = Harness::new();
    let id = insert_url(&h, "abc123", ChronoDuration::hours(1)).await;
    h.backend.mark_uploaded("abc123");

    let outcome = h.ctx.upload_monitor().check(&id, false).await.unwrap();
    assert_eq!(outcome, UploadCheckOutcome::Detected { created: true });

    let video = h.store.get_video(&id).await.unwrap().unwrap();
    assert_eq!(video.title, "clip.mp4");
    assert_eq!(video.owner_id, "u1");
    assert_eq!(h.dispatcher.transcode_dispatches("abc123"), 1);

    let url = h.store.get_upload_url(&id).await.unwrap().unwrap();
    assert!(url.was_used);
    assert!(url.last_checked.is_some());

    // A later check does nothing
    let checks = h.backend.upload_checks();
    let outcome = h.ctx.upload_monitor().check(&id, false).await.unwrap();
    assert_eq!(outcome, UploadCheckOutcome::AlreadyProcessed);
    assert_eq!(h.backend.upload_checks(), checks);
    assert_eq!(h.dispatcher.transcode_dispatches("abc123"), 1);
}

#[tokio::test]
async fn test_not_uploaded_records_check() {
    let h = Harness::new();
    let id = insert_url(&h, "abc124", ChronoDuration::hours(1)).await;

    let outcome = h.ctx.upload_monitor().check(&id, false).await.unwrap();
    assert_eq!(outcome, UploadCheckOutcome::NotUploaded);

    let url = h.store.get_upload_url(&id).await.unwrap().unwrap();
    assert!(!url.was_used);
    assert!(url.last_checked.is_some());
    assert!(h.store.get_video(&id).await.unwrap().is_none());
    assert!(h.dispatcher.jobs().is_empty());
}

#[tokio::test]
async fn test_unknown_url() {
    let h = Harness::new();
    let outcome = h
        .ctx
        .upload_monitor()
        .check(&VideoId::from("missing"), false)
        .await
        .unwrap();
    assert_eq!(outcome, UploadCheckOutcome::UnknownUrl);
    assert_eq!(h.backend.upload_checks(), 0);
}

#[tokio::test]
async fn test_concurrent_checks_create_one_video() {
    let h = Harness::new();
    let id = insert_url(&h, "abc125", ChronoDuration::hours(1)).await;
    h.backend.mark_uploaded("abc125");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ctx = h.ctx.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            ctx.upload_monitor().check(&id, false).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(h.store.get_video(&id).await.unwrap().is_some());
    assert_eq!(h.dispatcher.transcode_dispatches("abc125"), 1);
}

#[tokio::test]
async fn test_held_lock_skips_or_waits() {
    let h = Harness::new();
    let id = insert_url(&h, "abc126", ChronoDuration::hours(1)).await;

    let token = h
        .locks
        .try_acquire(&monitor_upload_lock(&id), None)
        .await
        .unwrap();

    let outcome = h.ctx.upload_monitor().check(&id, false).await.unwrap();
    assert_eq!(outcome, UploadCheckOutcome::Skipped);
    assert_eq!(h.backend.upload_checks(), 0);

    let locks = h.locks.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        locks.release(&token).await;
    });

    let outcome = h.ctx.upload_monitor().check(&id, true).await.unwrap();
    assert_eq!(outcome, UploadCheckOutcome::Waited);
}

#[tokio::test]
async fn test_sweep_dispatches_due_urls() {
    let h = Harness::new();
    let due = insert_url(&h, "due001", ChronoDuration::hours(1)).await;
    // Expired within the grace period: still checked
    let grace = insert_url(&h, "grace1", ChronoDuration::minutes(-30)).await;
    // Expired past the grace period
    insert_url(&h, "old001", ChronoDuration::hours(-3)).await;
    // Recently checked
    let recent = insert_url(&h, "recent", ChronoDuration::hours(1)).await;
    h.store
        .save_upload_check(&recent, false, Utc::now())
        .await
        .unwrap();

    let dispatched = h.ctx.upload_monitor().sweep().await.unwrap();
    assert_eq!(dispatched, 2);

    let mut ids: Vec<VideoId> = h
        .dispatcher
        .jobs()
        .iter()
        .map(|job| job.video_id().clone())
        .collect();
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(ids, vec![due, grace]);
    assert_eq!(h.dispatcher.monitor_dispatches(), 2);
}

#[tokio::test]
async fn test_issue_upload_grant() {
    let h = Harness::new();
    let playlist = Playlist::new("Holidays", "u1", Utc::now());
    h.store.create_playlist(&playlist).await.unwrap();

    let grant = h
        .ctx
        .upload_monitor()
        .issue_upload_grant(
            "u1",
            "  holidays.mp4 ",
            Some(&playlist.public_id),
            Some("https://app.example.com:8443/upload?x=1"),
        )
        .await
        .unwrap();

    let url = h.store.get_upload_url(&grant.id).await.unwrap().unwrap();
    assert_eq!(url.filename, "holidays.mp4");
    assert_eq!(url.owner_id, "u1");
    assert_eq!(url.playlist_id, Some(playlist.public_id.clone()));
    assert_eq!(url.origin.as_deref(), Some("https://app.example.com:8443"));
    assert!(!url.was_used);

    // Detection attaches the video to the playlist
    h.backend.mark_uploaded(grant.id.as_str());
    h.ctx.upload_monitor().check(&grant.id, false).await.unwrap();
    let playlists = h.store.list_playlists_for_video(&grant.id).await.unwrap();
    assert_eq!(playlists.len(), 1);
    assert_eq!(playlists[0].public_id, playlist.public_id);
}

#[tokio::test]
async fn test_issue_upload_grant_rejects_bad_input() {
    let h = Harness::new();
    let monitor = h.ctx.upload_monitor();

    assert!(matches!(
        monitor.issue_upload_grant("u1", "   ", None, None).await,
        Err(WorkerError::InvalidRequest(_))
    ));
    let long_name = "a".repeat(300);
    assert!(matches!(
        monitor.issue_upload_grant("u1", &long_name, None, None).await,
        Err(WorkerError::InvalidRequest(_))
    ));
    assert!(matches!(
        monitor
            .issue_upload_grant("u1", "a.mp4", None, Some("ftp://example.com"))
            .await,
        Err(WorkerError::InvalidRequest(_))
    ));

    // Somebody else's playlist
    let playlist = Playlist::new("Private", "u2", Utc::now());
    h.store.create_playlist(&playlist).await.unwrap();
    assert!(matches!(
        monitor
            .issue_upload_grant("u1", "a.mp4", Some(&playlist.public_id), None)
            .await,
        Err(WorkerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_adopt_stored_source() {
    let h = Harness::new();
    let id = issue(&h, "raw.mp4").await;

    let created = h
        .ctx
        .upload_monitor()
        .adopt_stored_source(&id, "My video", "sources/raw.mp4")
        .await
        .unwrap();
    assert_eq!(created, id);

    let video = h.store.get_video(&id).await.unwrap().unwrap();
    assert_eq!(video.title, "My video");
    assert_eq!(video.storage_path.as_deref(), Some("sources/raw.mp4"));
    assert_eq!(h.dispatcher.transcode_dispatches(id.as_str()), 1);

    // The url is used now
    assert!(matches!(
        h.ctx
            .upload_monitor()
            .adopt_stored_source(&id, "Again", "sources/raw.mp4")
            .await,
        Err(WorkerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_adopt_stored_source_reports_missing_arguments() {
    let h = Harness::new();
    let id = issue(&h, "raw.mp4").await;

    let err = h
        .ctx
        .upload_monitor()
        .adopt_stored_source(&id, " ", "")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing argument: path, name"));
    assert!(h.store.get_video(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_process_task_runs_upload_check() {
    let h = Harness::new();
    let id = insert_url(&h, "abc127", ChronoDuration::hours(1)).await;
    h.backend.mark_uploaded("abc127");

    let job = QueueJob::from(MonitorUploadJob::new(id.clone()).waiting());
    process_task(&h.ctx, &job).await.unwrap();

    assert!(h.store.get_video(&id).await.unwrap().is_some());
    assert_eq!(h.dispatcher.transcode_dispatches("abc127"), 1);
}
