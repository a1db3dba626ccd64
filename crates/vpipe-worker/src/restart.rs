//! Restart sweep.
//!
//! Operators request a new transcoding attempt by setting a video's
//! status to `restart`. The sweep claims those rows (moving them back to
//! `pending`) and dispatches one transcoding task per claimed video.

use std::sync::Arc;

use tracing::{error, info};

use vpipe_models::VideoId;
use vpipe_queue::TranscodeVideoJob;

use crate::context::PipelineContext;
use crate::error::WorkerResult;
use crate::metrics;

pub struct RestartSweeper {
    ctx: Arc<PipelineContext>,
}

impl RestartSweeper {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Flag a video for a new transcoding attempt. Returns false if the
    /// video does not exist.
    pub async fn request_restart(&self, video_id: &VideoId) -> WorkerResult<bool> {
        let flagged = self.ctx.store.request_restart(video_id).await?;
        if flagged {
            self.ctx.cache.invalidate(video_id).await;
            info!(video_id = %video_id, "Restart requested");
        }
        Ok(flagged)
    }

    /// Claim pending restarts and dispatch their transcoding.
    ///
    /// Returns the number of claimed videos.
    pub async fn sweep(&self) -> WorkerResult<usize> {
        let claimed = self
            .ctx
            .store
            .claim_restarts(self.ctx.config.restart_batch_size)
            .await?;

        for video_id in &claimed {
            self.ctx.cache.invalidate(video_id).await;
            let job = TranscodeVideoJob::new(video_id.clone());
            if let Err(e) = self.ctx.dispatcher.dispatch(job.into()).await {
                error!(video_id = %video_id, "Failed to dispatch restart: {}", e);
                // Re-flag for the next sweep
                if let Err(e) = self.ctx.store.request_restart(video_id).await {
                    error!(video_id = %video_id, "Failed to re-flag restart: {}", e);
                }
            }
        }

        if !claimed.is_empty() {
            metrics::record_restarts_claimed(claimed.len());
            info!(count = claimed.len(), "Claimed restarts");
        }
        Ok(claimed.len())
    }
}
