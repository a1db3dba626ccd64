//! Subtitle ingestion.

use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tracing::{error, info};
use validator::Validate;

use vpipe_backend::BackendError;
use vpipe_models::{NewSubtitle, Subtitle, SubtitleId, VideoId};
use vpipe_store::StoreError;

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::subtitle;

/// Validates, converts and stores subtitles.
pub struct SubtitleIngestor {
    ctx: Arc<PipelineContext>,
}

impl SubtitleIngestor {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Attach a subtitle file to a video.
    ///
    /// The subtitle row only exists if the converted file was stored by
    /// the backend. Invalid files are rejected before anything is written.
    pub async fn ingest(&self, video_id: &VideoId, language: &str, raw: &[u8]) -> WorkerResult<Subtitle> {
        let result = self.ingest_inner(video_id, language, raw).await;
        match &result {
            Ok(_) => metrics::record_subtitle_ingested("success"),
            Err(e) if e.is_validation() => metrics::record_subtitle_ingested("invalid"),
            Err(_) => metrics::record_subtitle_ingested("error"),
        }
        result
    }

    async fn ingest_inner(&self, video_id: &VideoId, language: &str, raw: &[u8]) -> WorkerResult<Subtitle> {
        let max_bytes = self.ctx.config.subtitles_max_bytes;
        if raw.len() > max_bytes {
            return Err(BackendError::SubtitleInvalid(format!(
                "File too large: {} bytes (max {})",
                raw.len(),
                max_bytes
            ))
            .into());
        }

        let request = NewSubtitle::new(language.trim());
        request
            .validate()
            .map_err(|e| WorkerError::invalid_request(format!("invalid language: {}", e)))?;

        if self.ctx.store.get_video(video_id).await?.is_none() {
            return Err(WorkerError::not_found(format!("video {}", video_id)));
        }

        let content = subtitle::normalize(raw)?;
        let subtitle = request.into_subtitle(video_id.clone(), Utc::now());

        let backend = &self.ctx.backend;
        let upload = async {
            backend
                .upload_subtitle(video_id, &subtitle.public_id, &subtitle.language, &content)
                .await
                .map_err(anyhow::Error::from)
        }
        .boxed();

        match self.ctx.store.create_subtitle(&subtitle, upload).await {
            Ok(()) => {}
            Err(StoreError::Aborted(e)) => {
                return Err(match e.downcast::<BackendError>() {
                    Ok(backend_error) => WorkerError::Backend(backend_error),
                    Err(other) => WorkerError::job_failed(other.to_string()),
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.ctx.cache.invalidate(video_id).await;
        info!(
            video_id = %video_id,
            subtitle_id = %subtitle.public_id,
            language = %subtitle.language,
            "Subtitle ingested"
        );
        Ok(subtitle)
    }

    /// Delete a subtitle and its stored file. Returns false if it did not
    /// exist.
    pub async fn delete_subtitle(&self, subtitle_id: &SubtitleId) -> WorkerResult<bool> {
        let Some(subtitle) = self.ctx.store.get_subtitle(subtitle_id).await? else {
            return Ok(false);
        };
        if !self.ctx.store.delete_subtitle(subtitle_id).await? {
            return Ok(false);
        }
        self.ctx.cache.invalidate(&subtitle.video_id).await;

        if let Err(e) = self
            .ctx
            .backend
            .delete_subtitle(&subtitle.video_id, subtitle_id)
            .await
        {
            error!(
                video_id = %subtitle.video_id,
                subtitle_id = %subtitle_id,
                "Failed to delete subtitle file: {}", e
            );
            return Err(e.into());
        }

        info!(video_id = %subtitle.video_id, subtitle_id = %subtitle_id, "Subtitle deleted");
        Ok(true)
    }
}
