//! Video deletion and thumbnails.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageOutputFormat};
use tracing::{error, info, warn};

use vpipe_backend::BackendError;
use vpipe_models::utils::{random_id, LONG_ID_LEN};
use vpipe_models::VideoId;

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_when, RetryConfig, RetryResult};

const THUMBNAIL_JPEG_QUALITY: u8 = 90;

/// Deletes videos and manages their thumbnails.
pub struct AssetService {
    ctx: Arc<PipelineContext>,
}

impl AssetService {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Delete a video, its owned rows and every stored asset.
    ///
    /// Backend deletion is retried; if it still fails the error is
    /// returned after the rows are gone. Returns false if the video did
    /// not exist.
    pub async fn delete_video(&self, video_id: &VideoId) -> WorkerResult<bool> {
        if !self.ctx.store.delete_video(video_id).await? {
            return Ok(false);
        }
        self.ctx.cache.invalidate(video_id).await;

        let config = RetryConfig::new("delete_video")
            .with_max_retries(self.ctx.config.backend_delete_retries);
        let backend = &self.ctx.backend;
        let result = retry_when(
            &config,
            || backend.delete_video(video_id),
            BackendError::is_retryable,
        )
        .await;

        match result {
            RetryResult::Success(()) => {
                info!(video_id = %video_id, "Video deleted");
                Ok(true)
            }
            RetryResult::Failed { error, attempts } => {
                error!(
                    video_id = %video_id,
                    attempts,
                    "Failed to delete video assets: {}", error
                );
                Err(error.into())
            }
        }
    }

    /// Replace the thumbnail of a video with an uploaded image.
    ///
    /// The image is scaled down to fit `thumbnails_size` and stored as JPEG
    /// under a new thumbnail id. Returns the new thumbnail url.
    pub async fn upload_thumbnail(&self, video_id: &VideoId, raw: &[u8]) -> WorkerResult<String> {
        let video = self
            .ctx
            .store
            .get_video(video_id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("video {}", video_id)))?;

        let jpeg = encode_thumbnail(raw, self.ctx.config.thumbnails_size)?;
        let thumbnail_id = random_id(LONG_ID_LEN);

        self.ctx
            .backend
            .upload_thumbnail(video_id, &thumbnail_id, &jpeg)
            .await?;
        if !self.ctx.store.set_thumbnail_id(video_id, &thumbnail_id).await? {
            return Err(WorkerError::not_found(format!("video {}", video_id)));
        }
        self.ctx.cache.invalidate(video_id).await;

        match self
            .ctx
            .backend
            .delete_thumbnail(video_id, &video.thumbnail_id)
            .await
        {
            Ok(()) | Err(BackendError::Unsupported(_)) => {}
            Err(e) => warn!(video_id = %video_id, "Failed to delete previous thumbnail: {}", e),
        }

        info!(video_id = %video_id, thumbnail_id = %thumbnail_id, "Thumbnail uploaded");
        Ok(self.ctx.backend.thumbnail_url(video_id, &thumbnail_id))
    }
}

/// Decode an image, scale it down to fit in `max_size` x `max_size` and
/// encode it as JPEG.
pub fn encode_thumbnail(raw: &[u8], max_size: u32) -> WorkerResult<Vec<u8>> {
    let image = image::load_from_memory(raw)
        .map_err(|e| BackendError::ThumbnailInvalid(format!("Could not decode image: {}", e)))?;

    let image = if image.width() > max_size || image.height() > max_size {
        image.thumbnail(max_size, max_size)
    } else {
        image
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut jpeg = Vec::new();
    rgb.write_to(
        &mut Cursor::new(&mut jpeg),
        ImageOutputFormat::Jpeg(THUMBNAIL_JPEG_QUALITY),
    )
    .map_err(|e| BackendError::ThumbnailInvalid(format!("Could not encode image: {}", e)))?;
    Ok(jpeg)
}
