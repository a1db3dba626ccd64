//! Transcoding driver.
//!
//! Starts the backend jobs of a video, polls them until every job has
//! either finished or failed, and records the outcome on the processing
//! state. Runs are serialized per video by the transcode lock.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use vpipe_backend::{BackendError, JobHandle};
use vpipe_models::{ProcessingState, ProcessingStatus, VideoId};
use vpipe_queue::TranscodeMode;

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::lock::{run_exclusive, transcode_lock};
use crate::metrics;
use crate::retry::{retry_when, RetryConfig, RetryResult};

/// Failure message when the backend starts no job at all.
pub const NO_JOBS_MESSAGE: &str = "no transcoding jobs were started";

/// Result of a transcoding run.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeOutcome {
    /// Another run holds the lock; nothing was done.
    Skipped,
    /// Every job finished; `formats` renditions were recorded.
    Succeeded { formats: usize },
    /// At least one job failed.
    Failed { message: String },
}

impl TranscodeOutcome {
    fn label(&self) -> &'static str {
        match self {
            TranscodeOutcome::Skipped => "skipped",
            TranscodeOutcome::Succeeded { .. } => "success",
            TranscodeOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum JobState {
    Running,
    Succeeded,
    Failed(String),
}

/// Tracks the latest known progress of each job.
///
/// The aggregate is the mean over all jobs, clamped to [0, 100] and never
/// lower than a previously returned aggregate.
#[derive(Debug)]
pub struct ProgressAggregator {
    progress: Vec<f64>,
    states: Vec<JobState>,
    last: f64,
}

impl ProgressAggregator {
    pub fn new(jobs: usize) -> Self {
        Self {
            progress: vec![0.0; jobs],
            states: vec![JobState::Running; jobs],
            last: 0.0,
        }
    }

    pub fn is_resolved(&self, index: usize) -> bool {
        self.states
            .get(index)
            .is_some_and(|state| *state != JobState::Running)
    }

    pub fn all_resolved(&self) -> bool {
        self.states.iter().all(|state| *state != JobState::Running)
    }

    pub fn update(&mut self, index: usize, percent: f64) {
        if let Some(progress) = self.progress.get_mut(index) {
            *progress = if percent.is_finite() {
                percent.clamp(0.0, 100.0)
            } else {
                0.0
            };
        }
    }

    /// Finished jobs count as 100%.
    pub fn succeed(&mut self, index: usize) {
        self.update(index, 100.0);
        if let Some(state) = self.states.get_mut(index) {
            *state = JobState::Succeeded;
        }
    }

    /// Failed jobs keep their last known progress.
    pub fn fail(&mut self, index: usize, message: String) {
        if let Some(state) = self.states.get_mut(index) {
            *state = JobState::Failed(message);
        }
    }

    pub fn aggregate(&mut self) -> f64 {
        if self.progress.is_empty() {
            return self.last;
        }
        let mean = self.progress.iter().sum::<f64>() / self.progress.len() as f64;
        self.last = self.last.max(mean.clamp(0.0, 100.0));
        self.last
    }

    /// Failure messages in job order.
    pub fn errors(&self) -> Vec<&str> {
        self.states
            .iter()
            .filter_map(|state| match state {
                JobState::Failed(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Drives the backend transcoding jobs of a video to completion.
pub struct TranscodingDriver {
    ctx: Arc<PipelineContext>,
}

impl TranscodingDriver {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Transcode `video_id`.
    ///
    /// Returns `Skipped` without touching anything if a run is already in
    /// progress for this video. Errors other than job failures are
    /// recorded on the processing state and returned.
    pub async fn run(&self, video_id: &VideoId, mode: TranscodeMode) -> WorkerResult<TranscodeOutcome> {
        let lock = transcode_lock(video_id);
        let started = Instant::now();

        let result = run_exclusive(
            self.ctx.locks.as_ref(),
            &lock,
            self.ctx.config.transcode_lock_ttl,
            self.run_locked(video_id, mode),
        )
        .await;

        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Err(WorkerError::LockUnavailable(_)) => {
                metrics::record_lock_contention("transcode");
                debug!(video_id = %video_id, "Transcoding already running");
                Ok(TranscodeOutcome::Skipped)
            }
            Ok(outcome) => {
                metrics::record_transcode(mode.as_str(), outcome.label(), elapsed);
                Ok(outcome)
            }
            Err(e) => {
                metrics::record_transcode(mode.as_str(), "error", elapsed);
                Err(e)
            }
        }
    }

    async fn run_locked(&self, video_id: &VideoId, mode: TranscodeMode) -> WorkerResult<TranscodeOutcome> {
        self.ctx.cache.invalidate(video_id).await;
        let result = self.transcode(video_id, mode).await;
        if let Err(e) = &result {
            error!(video_id = %video_id, mode = mode.as_str(), "Transcoding error: {}", e);
            if mode == TranscodeMode::Full {
                if let Err(e) = self.ctx.store.delete_formats(video_id).await {
                    error!(video_id = %video_id, "Failed to delete formats of failed video: {}", e);
                }
            }
            self.record_failure(video_id, &e.failure_message()).await;
        }
        self.ctx.cache.invalidate(video_id).await;
        result
    }

    async fn transcode(&self, video_id: &VideoId, mode: TranscodeMode) -> WorkerResult<TranscodeOutcome> {
        let store = &self.ctx.store;
        let backend = &self.ctx.backend;

        let mut state = store
            .get_processing_state(video_id)
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("video {}", video_id)))?;
        state.begin_attempt(Utc::now());
        store.save_processing_state(&state).await?;

        let jobs = match mode {
            TranscodeMode::Full => backend.start_transcoding(video_id).await?,
            TranscodeMode::Additional => backend.start_additional_transcoding(video_id).await?,
        };
        if jobs.is_empty() {
            return Err(WorkerError::job_failed(NO_JOBS_MESSAGE));
        }
        info!(video_id = %video_id, mode = mode.as_str(), jobs = jobs.len(), "Transcoding started");

        let aggregator = self.poll_jobs(video_id, &jobs, &mut state).await?;
        let errors = aggregator.errors();

        if mode == TranscodeMode::Full {
            let deleted = store.delete_formats(video_id).await?;
            debug!(video_id = %video_id, deleted, "Deleted previous formats");
        }

        if !errors.is_empty() {
            let message = errors.join("\n");
            state.fail(message.clone());
            store.save_processing_state(&state).await?;
            warn!(video_id = %video_id, "Transcoding failed: {}", message);

            if mode == TranscodeMode::Full {
                // Failed videos keep no assets
                self.delete_assets(video_id).await?;
            }
            return Ok(TranscodeOutcome::Failed {
                message: state.message,
            });
        }

        // Formats exist before the status turns success
        let formats = match mode {
            TranscodeMode::Full => backend.list_formats(video_id).await?,
            TranscodeMode::Additional => backend.list_additional_formats(video_id).await?,
        };
        for format in &formats {
            store.create_format(video_id, format).await?;
        }

        state.succeed();
        store.save_processing_state(&state).await?;
        info!(video_id = %video_id, formats = formats.len(), "Transcoding succeeded");

        Ok(TranscodeOutcome::Succeeded {
            formats: formats.len(),
        })
    }

    /// Poll every unresolved job until all are resolved, persisting the
    /// aggregate progress after each pass.
    async fn poll_jobs(
        &self,
        video_id: &VideoId,
        jobs: &[JobHandle],
        state: &mut ProcessingState,
    ) -> WorkerResult<ProgressAggregator> {
        let mut aggregator = ProgressAggregator::new(jobs.len());

        loop {
            for (index, job) in jobs.iter().enumerate() {
                if aggregator.is_resolved(index) {
                    continue;
                }
                match self.ctx.backend.check_progress(job).await {
                    Ok(progress) if progress.done => aggregator.succeed(index),
                    Ok(progress) => aggregator.update(index, progress.percent),
                    Err(BackendError::TranscodingFailed(message)) => {
                        warn!(video_id = %video_id, job_id = %job.id, "Transcoding job failed: {}", message);
                        aggregator.fail(index, message);
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            state.set_progress(aggregator.aggregate());
            self.ctx.store.save_processing_state(state).await?;
            self.ctx.cache.invalidate(video_id).await;

            if aggregator.all_resolved() {
                return Ok(aggregator);
            }
            tokio::time::sleep(self.ctx.config.transcode_poll_interval).await;
        }
    }

    async fn delete_assets(&self, video_id: &VideoId) -> WorkerResult<()> {
        let config = RetryConfig::new("delete_video").with_max_retries(self.ctx.config.backend_delete_retries);
        let backend = &self.ctx.backend;
        let result = retry_when(&config, || backend.delete_video(video_id), BackendError::is_retryable).await;

        match result {
            RetryResult::Success(()) => Ok(()),
            RetryResult::Failed { error, attempts } => {
                error!(
                    video_id = %video_id,
                    attempts,
                    "Failed to delete assets of failed video: {}", error
                );
                Err(error.into())
            }
        }
    }

    /// Mark the video failed with `message`, unless this attempt already
    /// recorded its own failure.
    async fn record_failure(&self, video_id: &VideoId, message: &str) {
        let store = &self.ctx.store;
        let mut state = match store.get_processing_state(video_id).await {
            Ok(Some(state)) => state,
            Ok(None) => return,
            Err(e) => {
                error!(video_id = %video_id, "Failed to load processing state: {}", e);
                return;
            }
        };
        if state.status == ProcessingStatus::Failed {
            return;
        }
        state.fail(message);
        if let Err(e) = store.save_processing_state(&state).await {
            error!(video_id = %video_id, "Failed to record transcoding failure: {}", e);
        }
    }
}
