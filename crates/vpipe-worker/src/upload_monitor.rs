//! Upload detection.
//!
//! The periodic sweep only dispatches one check task per upload url so
//! that a large backlog never delays it. Each check runs under a short
//! per-url lock; when it detects an upload it creates the video and
//! starts transcoding exactly once.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use vpipe_backend::BackendError;
use vpipe_models::{NewVideo, PlaylistId, UploadGrant, VideoId, VideoUploadUrl};
use vpipe_queue::{MonitorUploadJob, TranscodeVideoJob};

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::lock::{monitor_upload_lock, run_exclusive};
use crate::metrics;

/// Maximum accepted filename length.
const MAX_FILENAME_LEN: usize = 255;

/// Result of one upload check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCheckOutcome {
    /// Another check holds the lock and the caller did not wait.
    Skipped,
    /// Another check held the lock; it has been released since.
    Waited,
    /// No upload url with this id.
    UnknownUrl,
    /// The upload was already detected and the video exists.
    AlreadyProcessed,
    /// Nothing was uploaded yet.
    NotUploaded,
    /// An upload was detected. `created` is true if this check created
    /// the video (and dispatched its transcoding).
    Detected { created: bool },
}

/// Detects uploads on issued upload urls.
pub struct UploadMonitor {
    ctx: Arc<PipelineContext>,
}

impl UploadMonitor {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Dispatch one check task per upload url due for a check.
    ///
    /// Returns the number of dispatched tasks. Never waits for the checks.
    pub async fn sweep(&self) -> WorkerResult<usize> {
        let policy = self.ctx.config.upload_check_policy();
        let urls = self
            .ctx
            .store
            .list_upload_urls_to_check(&policy, Utc::now(), self.ctx.config.upload_sweep_batch)
            .await?;

        let mut dispatched = 0;
        for url in urls {
            let job = MonitorUploadJob::new(url.public_video_id.clone());
            match self.ctx.dispatcher.dispatch(job.into()).await {
                Ok(true) => dispatched += 1,
                Ok(false) => debug!(video_id = %url.public_video_id, "Upload check already queued"),
                Err(e) => warn!(video_id = %url.public_video_id, "Failed to dispatch upload check: {}", e),
            }
        }

        metrics::record_upload_sweep(dispatched);
        if dispatched > 0 {
            info!(dispatched, "Upload sweep dispatched checks");
        }
        Ok(dispatched)
    }

    /// Check whether a file was uploaded on the url of `video_id`.
    ///
    /// With `wait`, a concurrent check is waited for instead of skipped,
    /// so that the caller observes its effects on return.
    pub async fn check(&self, video_id: &VideoId, wait: bool) -> WorkerResult<UploadCheckOutcome> {
        let lock = monitor_upload_lock(video_id);
        let result = run_exclusive(
            self.ctx.locks.as_ref(),
            &lock,
            Some(self.ctx.config.upload_lock_ttl),
            self.check_locked(video_id),
        )
        .await;

        match result {
            Err(WorkerError::LockUnavailable(_)) => {
                metrics::record_lock_contention("monitor_upload");
                if wait {
                    self.ctx.locks.wait_until_released(&lock).await?;
                    Ok(UploadCheckOutcome::Waited)
                } else {
                    debug!(video_id = %video_id, "Upload check already running");
                    Ok(UploadCheckOutcome::Skipped)
                }
            }
            other => other,
        }
    }

    async fn check_locked(&self, video_id: &VideoId) -> WorkerResult<UploadCheckOutcome> {
        let store = &self.ctx.store;
        let Some(upload_url) = store.get_upload_url(video_id).await? else {
            warn!(video_id = %video_id, "No upload url for video");
            return Ok(UploadCheckOutcome::UnknownUrl);
        };

        if upload_url.was_used && store.get_video(video_id).await?.is_some() {
            return Ok(UploadCheckOutcome::AlreadyProcessed);
        }

        let checked = self.ctx.backend.check_upload(video_id).await;
        let uploaded = checked.is_ok();
        // last_checked is recorded whatever the backend answered
        store.save_upload_check(video_id, uploaded, Utc::now()).await?;

        match checked {
            Ok(()) => {}
            Err(BackendError::NotUploaded(_)) => {
                metrics::record_upload_check(false);
                return Ok(UploadCheckOutcome::NotUploaded);
            }
            Err(e) => return Err(e.into()),
        }
        metrics::record_upload_check(true);

        let created = self.create_video(&upload_url).await?;
        Ok(UploadCheckOutcome::Detected { created })
    }

    /// Create the video of a used upload url, attach it to the url's
    /// playlist and start transcoding if it did not exist yet.
    async fn create_video(&self, upload_url: &VideoUploadUrl) -> WorkerResult<bool> {
        let video_id = &upload_url.public_video_id;
        let new_video = NewVideo::new(
            video_id.clone(),
            upload_url.owner_id.clone(),
            upload_url.filename.clone(),
        );
        let (_, created) = self
            .ctx
            .store
            .get_or_create_video(&new_video, Utc::now())
            .await?;

        if let Some(playlist_id) = &upload_url.playlist_id {
            self.ctx
                .store
                .add_video_to_playlist(playlist_id, video_id)
                .await?;
        }
        self.ctx.cache.invalidate(video_id).await;

        if created {
            info!(video_id = %video_id, "Upload detected, starting transcoding");
            self.dispatch_transcode(video_id).await;
        }
        Ok(created)
    }

    async fn dispatch_transcode(&self, video_id: &VideoId) {
        let job = TranscodeVideoJob::new(video_id.clone());
        if let Err(e) = self.ctx.dispatcher.dispatch(job.into()).await {
            warn!(video_id = %video_id, "Failed to dispatch transcoding: {}", e);
        }
    }

    /// Issue an upload url for `filename` on behalf of `owner_id`.
    ///
    /// The playlist, if any, must belong to the owner. The origin, if any,
    /// is stored in its serialized form (`scheme://host[:port]`).
    pub async fn issue_upload_grant(
        &self,
        owner_id: &str,
        filename: &str,
        playlist_id: Option<&PlaylistId>,
        origin: Option<&str>,
    ) -> WorkerResult<UploadGrant> {
        let filename = filename.trim();
        if filename.is_empty() || filename.chars().count() > MAX_FILENAME_LEN {
            return Err(WorkerError::invalid_request("invalid filename"));
        }

        let origin = origin.map(normalize_origin).transpose()?;

        if let Some(playlist_id) = playlist_id {
            match self.ctx.store.get_playlist(playlist_id).await? {
                Some(playlist) if playlist.is_owned_by(owner_id) => {}
                _ => {
                    return Err(WorkerError::not_found(format!("playlist {}", playlist_id)));
                }
            }
        }

        let grant = self.ctx.backend.get_upload_url(filename).await?;
        let upload_url = VideoUploadUrl::from_grant(&grant, filename, owner_id, Utc::now())
            .with_playlist(playlist_id.cloned())
            .with_origin(origin);
        self.ctx.store.create_upload_url(&upload_url).await?;

        info!(video_id = %grant.id, owner_id, "Issued upload url");
        Ok(grant)
    }

    /// Start transcoding a video whose source file is already on storage.
    ///
    /// The upload url of `video_id` must still be available; it is marked
    /// used and the video is created with `storage_path` as its source.
    pub async fn adopt_stored_source(
        &self,
        video_id: &VideoId,
        title: &str,
        storage_path: &str,
    ) -> WorkerResult<VideoId> {
        let mut missing = Vec::new();
        if storage_path.trim().is_empty() {
            missing.push("path");
        }
        if title.trim().is_empty() {
            missing.push("name");
        }
        if !missing.is_empty() {
            return Err(WorkerError::invalid_request(format!(
                "missing argument: {}",
                missing.join(", ")
            )));
        }

        let upload_url = self
            .ctx
            .store
            .claim_upload_url(video_id, Utc::now())
            .await?
            .ok_or_else(|| WorkerError::not_found(format!("upload url {}", video_id)))?;

        let new_video = NewVideo::new(video_id.clone(), upload_url.owner_id.clone(), title.trim())
            .with_storage_path(storage_path.trim());
        let video = self.ctx.store.create_video(&new_video, Utc::now()).await?;

        if let Some(playlist_id) = &upload_url.playlist_id {
            self.ctx
                .store
                .add_video_to_playlist(playlist_id, video_id)
                .await?;
        }
        self.ctx.cache.invalidate(video_id).await;
        self.dispatch_transcode(video_id).await;

        info!(video_id = %video_id, "Adopted stored source");
        Ok(video.public_id)
    }
}

/// Parse a CORS origin and return its serialized form.
fn normalize_origin(origin: &str) -> WorkerResult<String> {
    let parsed = url::Url::parse(origin.trim())
        .map_err(|e| WorkerError::invalid_request(format!("invalid origin: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(WorkerError::invalid_request(format!("invalid origin: {}", origin)));
    }
    Ok(parsed.origin().ascii_serialization())
}
