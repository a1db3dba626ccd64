//! Video format repository.

use async_trait::async_trait;
use vpipe_models::{FormatInfo, VideoFormat, VideoId};

use crate::error::StoreResult;

/// Repository for transcoded renditions.
#[async_trait]
pub trait FormatRepo: Send + Sync {
    /// Delete every format of a video. Returns the number of deleted rows.
    async fn delete_formats(&self, video_id: &VideoId) -> StoreResult<u64>;

    /// Record a rendition.
    async fn create_format(&self, video_id: &VideoId, info: &FormatInfo)
        -> StoreResult<VideoFormat>;

    /// List the formats of a video in creation order.
    async fn list_formats(&self, video_id: &VideoId) -> StoreResult<Vec<VideoFormat>>;
}
