//! Processing state repository.

use async_trait::async_trait;
use vpipe_models::{ProcessingState, VideoId};

use crate::error::StoreResult;

/// Repository for video processing states.
#[async_trait]
pub trait ProcessingRepo: Send + Sync {
    /// Get the processing state of a video.
    async fn get_processing_state(&self, video_id: &VideoId)
        -> StoreResult<Option<ProcessingState>>;

    /// Overwrite the processing state of a video.
    /// Fails with `NotFound` if the video has no state.
    async fn save_processing_state(&self, state: &ProcessingState) -> StoreResult<()>;

    /// Flag a video for a new transcoding attempt.
    /// Returns false if the video does not exist.
    async fn request_restart(&self, video_id: &VideoId) -> StoreResult<bool>;

    /// Atomically move up to `limit` states from `restart` to `pending`
    /// and return the claimed video ids. A state is claimed by one caller
    /// only.
    async fn claim_restarts(&self, limit: i64) -> StoreResult<Vec<VideoId>>;
}
