//! Backend capability trait.

use async_trait::async_trait;
use vpipe_models::{FormatInfo, SubtitleId, UploadGrant, VideoId};

use crate::error::{BackendError, BackendResult};
use crate::job::{JobHandle, JobProgress};

/// Transcoding and storage provider.
///
/// One implementation is chosen at process start and shared as
/// `Arc<dyn VideoBackend>`. Url constructors are called on every read and
/// must be cheap.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Issue a time-limited upload url for a new video.
    async fn get_upload_url(&self, filename: &str) -> BackendResult<UploadGrant>;

    /// Check whether a file was uploaded for `video_id`.
    /// Returns `BackendError::NotUploaded` when nothing was received yet.
    async fn check_upload(&self, video_id: &VideoId) -> BackendResult<()>;

    /// Create and start the transcoding jobs of a video.
    async fn start_transcoding(&self, video_id: &VideoId) -> BackendResult<Vec<JobHandle>>;

    /// Poll one job. A failed job returns `BackendError::TranscodingFailed`
    /// whose message is recorded on the video.
    async fn check_progress(&self, job: &JobHandle) -> BackendResult<JobProgress>;

    /// Renditions available once transcoding has finished.
    async fn list_formats(&self, video_id: &VideoId) -> BackendResult<Vec<FormatInfo>>;

    /// Start jobs producing extra renditions of an already transcoded video.
    async fn start_additional_transcoding(
        &self,
        _video_id: &VideoId,
    ) -> BackendResult<Vec<JobHandle>> {
        Err(BackendError::Unsupported("start_additional_transcoding"))
    }

    /// Extra renditions produced by [`start_additional_transcoding`](Self::start_additional_transcoding).
    async fn list_additional_formats(&self, _video_id: &VideoId) -> BackendResult<Vec<FormatInfo>> {
        Err(BackendError::Unsupported("list_additional_formats"))
    }

    /// Delete every stored asset of a video.
    async fn delete_video(&self, video_id: &VideoId) -> BackendResult<()>;

    /// Store a WebVTT subtitle.
    async fn upload_subtitle(
        &self,
        video_id: &VideoId,
        subtitle_id: &SubtitleId,
        language: &str,
        content: &str,
    ) -> BackendResult<()>;

    async fn delete_subtitle(&self, video_id: &VideoId, subtitle_id: &SubtitleId)
        -> BackendResult<()>;

    /// Store an already validated thumbnail image.
    async fn upload_thumbnail(
        &self,
        _video_id: &VideoId,
        _thumbnail_id: &str,
        _image: &[u8],
    ) -> BackendResult<()> {
        Err(BackendError::Unsupported("upload_thumbnail"))
    }

    async fn delete_thumbnail(&self, _video_id: &VideoId, _thumbnail_id: &str) -> BackendResult<()> {
        Err(BackendError::Unsupported("delete_thumbnail"))
    }

    /// Streaming or download url of one rendition.
    fn video_url(&self, video_id: &VideoId, format_name: &str) -> String;

    fn subtitle_url(&self, video_id: &VideoId, subtitle_id: &SubtitleId, language: &str) -> String;

    /// Thumbnail url, empty when thumbnails are not supported.
    fn thumbnail_url(&self, _video_id: &VideoId, _thumbnail_id: &str) -> String {
        String::new()
    }
}
