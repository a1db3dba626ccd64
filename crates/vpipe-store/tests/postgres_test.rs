//! PostgreSQL integration tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::FutureExt;
use uuid::Uuid;
use vpipe_models::{
    FormatInfo, NewSubtitle, NewVideo, ProcessingStatus, UploadCheckPolicy, UploadGrant,
    UploadMethod, VideoId, VideoUploadUrl,
};
use vpipe_store::{
    FormatRepo, PostgresStore, ProcessingRepo, StoreError, SubtitleRepo, UploadUrlRepo, VideoRepo,
};

async fn connect() -> PostgresStore {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PostgresStore::from_url(&url, 5, None)
        .await
        .expect("Failed to connect to PostgreSQL")
}

fn unique_id() -> VideoId {
    VideoId::from(Uuid::new_v4().simple().to_string()[..12].to_string())
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_get_or_create_is_atomic() {
    let store = Arc::new(connect().await);
    let id = unique_id();
    let now = Utc::now();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let video = NewVideo::new(id.clone(), "owner-1", "clip.mp4");
            tokio::spawn(async move { store.get_or_create_video(&video, now).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        let (_, was_created) = handle.await.unwrap().unwrap();
        if was_created {
            created += 1;
        }
    }
    assert_eq!(created, 1);

    let state = store.get_processing_state(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ProcessingStatus::Pending);
    assert!(store.delete_video(&id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_formats_and_restarts() {
    let store = connect().await;
    let id = unique_id();
    store
        .create_video(&NewVideo::new(id.clone(), "owner-1", "clip.mp4"), Utc::now())
        .await
        .unwrap();

    for (name, bitrate) in [("LD", 500.0), ("SD", 1000.0), ("HD", 4000.0)] {
        store
            .create_format(&id, &FormatInfo::new(name, bitrate))
            .await
            .unwrap();
    }
    let names: Vec<String> = store
        .list_formats(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["LD", "SD", "HD"]);
    assert_eq!(store.delete_formats(&id).await.unwrap(), 3);

    assert!(store.request_restart(&id).await.unwrap());
    let claimed = store.claim_restarts(1000).await.unwrap();
    assert!(claimed.contains(&id));
    let state = store.get_processing_state(&id).await.unwrap().unwrap();
    assert_eq!(state.status, ProcessingStatus::Pending);

    assert!(store.delete_video(&id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_subtitle_rolls_back_on_failed_upload() {
    let store = connect().await;
    let id = unique_id();
    store
        .create_video(&NewVideo::new(id.clone(), "owner-1", "clip.mp4"), Utc::now())
        .await
        .unwrap();

    let subtitle = NewSubtitle::new("fr").into_subtitle(id.clone(), Utc::now());
    let result = store
        .create_subtitle(&subtitle, async { Err::<(), _>(anyhow::anyhow!("bucket unavailable")) }.boxed())
        .await;
    assert!(matches!(result, Err(StoreError::Aborted(_))));
    assert!(store.list_subtitles(&id).await.unwrap().is_empty());

    store
        .create_subtitle(&subtitle, async { Ok::<(), anyhow::Error>(()) }.boxed())
        .await
        .unwrap();
    assert_eq!(store.list_subtitles(&id).await.unwrap().len(), 1);

    assert!(store.delete_video(&id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_upload_url_checks() {
    let store = connect().await;
    let id = unique_id();
    let now = Utc::now();
    let grant = UploadGrant {
        id: id.clone(),
        url: format!("https://uploads.example.com/{}", id),
        method: UploadMethod::Put,
        expires_at: now + Duration::hours(1),
    };
    store
        .create_upload_url(&VideoUploadUrl::from_grant(&grant, "clip.mp4", "owner-1", now))
        .await
        .unwrap();

    let policy = UploadCheckPolicy::default();
    let due = store
        .list_upload_urls_to_check(&policy, now, 10_000)
        .await
        .unwrap();
    assert!(due.iter().any(|url| url.public_video_id == id));

    store.save_upload_check(&id, false, now).await.unwrap();
    let due = store
        .list_upload_urls_to_check(&policy, now + Duration::seconds(1), 10_000)
        .await
        .unwrap();
    assert!(!due.iter().any(|url| url.public_video_id == id));

    let claimed = store.claim_upload_url(&id, now).await.unwrap().unwrap();
    assert!(claimed.was_used);
    assert!(store.claim_upload_url(&id, now).await.unwrap().is_none());
}
