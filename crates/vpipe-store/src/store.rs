//! Combined store trait.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::repos::{
    FormatRepo, PlaylistRepo, ProcessingRepo, SubtitleRepo, UploadUrlRepo, VideoRepo,
};

/// Combined video store trait.
#[async_trait]
pub trait VideoStore:
    VideoRepo
    + ProcessingRepo
    + FormatRepo
    + SubtitleRepo
    + UploadUrlRepo
    + PlaylistRepo
    + Send
    + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> StoreResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> StoreResult<()>;
}
