//! Video repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vpipe_models::{NewVideo, Video, VideoId};

use crate::error::StoreResult;

/// Repository for video records.
#[async_trait]
pub trait VideoRepo: Send + Sync {
    /// Get the video with `video.public_id`, creating it together with its
    /// pending processing state if it does not exist.
    ///
    /// The returned flag is true only for the caller whose insert created
    /// the row. Concurrent callers for the same id observe exactly one
    /// creation.
    async fn get_or_create_video(
        &self,
        video: &NewVideo,
        now: DateTime<Utc>,
    ) -> StoreResult<(Video, bool)>;

    /// Create a video and its processing state.
    /// Fails with `AlreadyExists` if the public id is taken.
    async fn create_video(&self, video: &NewVideo, now: DateTime<Utc>) -> StoreResult<Video>;

    /// Get a video by public id.
    async fn get_video(&self, video_id: &VideoId) -> StoreResult<Option<Video>>;

    /// List the videos of an owner, newest first.
    async fn list_videos_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Video>>;

    /// Replace the public thumbnail id. Returns false if the video does
    /// not exist.
    async fn set_thumbnail_id(&self, video_id: &VideoId, thumbnail_id: &str) -> StoreResult<bool>;

    /// Delete a video and every row it owns.
    /// Returns false if the video did not exist.
    async fn delete_video(&self, video_id: &VideoId) -> StoreResult<bool>;
}
