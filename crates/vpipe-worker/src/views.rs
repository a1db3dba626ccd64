//! Cached read views.

use std::sync::Arc;

use vpipe_models::{FormatView, ProcessingView, SubtitleView, VideoId, VideoView};

use crate::context::PipelineContext;
use crate::error::WorkerResult;
use crate::metrics;

/// Renders video views, going through the response cache.
pub struct VideoViewService {
    ctx: Arc<PipelineContext>,
}

impl VideoViewService {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Get the view of a video, rendering and caching it on a miss.
    /// Returns `None` if the video does not exist.
    pub async fn get_view(&self, video_id: &VideoId) -> WorkerResult<Option<VideoView>> {
        if let Some(view) = self.ctx.cache.get(video_id).await {
            metrics::record_cache_lookup(true);
            return Ok(Some(view));
        }
        metrics::record_cache_lookup(false);

        let Some(view) = self.render(video_id).await? else {
            return Ok(None);
        };
        self.ctx.cache.set(video_id, &view).await;
        Ok(Some(view))
    }

    /// Render a view from the store, bypassing the cache.
    pub async fn render(&self, video_id: &VideoId) -> WorkerResult<Option<VideoView>> {
        let store = &self.ctx.store;
        let backend = &self.ctx.backend;

        let Some(video) = store.get_video(video_id).await? else {
            return Ok(None);
        };
        let processing = store.get_processing_state(video_id).await?;
        let subtitles = store.list_subtitles(video_id).await?;
        let formats = store.list_formats(video_id).await?;

        Ok(Some(VideoView {
            id: video.public_id.clone(),
            title: video.title.clone(),
            processing: processing.as_ref().map(ProcessingView::from),
            subtitles: subtitles
                .iter()
                .map(|s| {
                    let url = backend.subtitle_url(video_id, &s.public_id, &s.language);
                    SubtitleView::new(s, url)
                })
                .collect(),
            formats: formats
                .iter()
                .map(|f| FormatView::new(f, backend.video_url(video_id, &f.name)))
                .collect(),
            thumbnail: backend.thumbnail_url(video_id, &video.thumbnail_id),
        }))
    }
}
