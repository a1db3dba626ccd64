//! Subtitle repository.

use async_trait::async_trait;
use futures::future::BoxFuture;
use vpipe_models::{Subtitle, SubtitleId, VideoId};

use crate::error::StoreResult;

/// Repository for subtitles.
#[async_trait]
pub trait SubtitleRepo: Send + Sync {
    /// Insert a subtitle, then run `upload` before committing.
    ///
    /// If `upload` fails the insert is rolled back and the error is
    /// returned as `StoreError::Aborted`.
    async fn create_subtitle(
        &self,
        subtitle: &Subtitle,
        upload: BoxFuture<'_, anyhow::Result<()>>,
    ) -> StoreResult<()>;

    async fn get_subtitle(&self, subtitle_id: &SubtitleId) -> StoreResult<Option<Subtitle>>;

    /// List the subtitles of a video in creation order.
    async fn list_subtitles(&self, video_id: &VideoId) -> StoreResult<Vec<Subtitle>>;

    /// Returns false if the subtitle did not exist.
    async fn delete_subtitle(&self, subtitle_id: &SubtitleId) -> StoreResult<bool>;
}
