//! Upload url repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vpipe_models::{UploadCheckPolicy, VideoId, VideoUploadUrl};

use crate::error::StoreResult;

/// Repository for upload grants.
#[async_trait]
pub trait UploadUrlRepo: Send + Sync {
    /// Record a new upload grant.
    /// Fails with `AlreadyExists` if the public video id is taken.
    async fn create_upload_url(&self, url: &VideoUploadUrl) -> StoreResult<()>;

    async fn get_upload_url(&self, video_id: &VideoId) -> StoreResult<Option<VideoUploadUrl>>;

    /// List the grants due for a backend check under `policy`, oldest
    /// expiry first.
    async fn list_upload_urls_to_check(
        &self,
        policy: &UploadCheckPolicy,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<VideoUploadUrl>>;

    /// Record the outcome of a backend check.
    ///
    /// `was_used` is only ever set, never cleared, and `last_checked`
    /// becomes `max(last_checked, checked_at)`.
    async fn save_upload_check(
        &self,
        video_id: &VideoId,
        was_used: bool,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Atomically mark an available grant (unused and unexpired) as used.
    /// Returns `None` if no such grant exists.
    async fn claim_upload_url(
        &self,
        video_id: &VideoId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<VideoUploadUrl>>;
}
