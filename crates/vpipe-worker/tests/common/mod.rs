//! Shared fixtures: a scripted backend, a recording dispatcher and an
//! in-memory pipeline.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use vpipe_backend::{BackendError, BackendResult, JobHandle, JobProgress, VideoBackend};
use vpipe_models::{FormatInfo, SubtitleId, UploadGrant, UploadMethod, VideoId};
use vpipe_queue::{QueueJob, QueueResult, TaskDispatcher};
use vpipe_store::{MemoryStore, ProcessingRepo};
use vpipe_worker::{MemoryLockManager, MemoryResponseCache, PipelineContext, WorkerConfig};

/// Scripted answer of one `check_progress` call.
#[derive(Debug, Clone)]
pub enum Step {
    Progress(f64),
    Done,
    Fail(String),
    /// Provider failure (not a job failure)
    Error(String),
}

#[derive(Default)]
struct State {
    next_grant: u32,
    uploaded: HashSet<VideoId>,
    scripts: HashMap<VideoId, Vec<VecDeque<Step>>>,
    additional_scripts: HashMap<VideoId, Vec<VecDeque<Step>>>,
    formats: HashMap<VideoId, Vec<FormatInfo>>,
    additional_formats: HashMap<VideoId, Vec<FormatInfo>>,
    start_calls: HashMap<VideoId, u32>,
    upload_checks: u32,
    deleted_videos: Vec<VideoId>,
    delete_failures: u32,
    subtitles: HashMap<SubtitleId, String>,
    deleted_subtitles: Vec<SubtitleId>,
    fail_subtitle_upload: bool,
    thumbnails: HashMap<String, Vec<u8>>,
    deleted_thumbnails: Vec<String>,
    progress_snapshots: Vec<f64>,
}

/// Backend whose answers are scripted by the test.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
    observed_store: Mutex<Option<Arc<MemoryStore>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_uploaded(&self, video_id: &str) {
        self.state.lock().unwrap().uploaded.insert(VideoId::from(video_id));
    }

    /// One step list per job, consumed one step per poll. The last step
    /// of a job repeats.
    pub fn script(&self, video_id: &str, jobs: Vec<Vec<Step>>) {
        self.state.lock().unwrap().scripts.insert(
            VideoId::from(video_id),
            jobs.into_iter().map(VecDeque::from).collect(),
        );
    }

    pub fn script_additional(&self, video_id: &str, jobs: Vec<Vec<Step>>) {
        self.state.lock().unwrap().additional_scripts.insert(
            VideoId::from(video_id),
            jobs.into_iter().map(VecDeque::from).collect(),
        );
    }

    pub fn set_formats(&self, video_id: &str, formats: Vec<FormatInfo>) {
        self.state
            .lock()
            .unwrap()
            .formats
            .insert(VideoId::from(video_id), formats);
    }

    pub fn set_additional_formats(&self, video_id: &str, formats: Vec<FormatInfo>) {
        self.state
            .lock()
            .unwrap()
            .additional_formats
            .insert(VideoId::from(video_id), formats);
    }

    pub fn fail_subtitle_uploads(&self) {
        self.state.lock().unwrap().fail_subtitle_upload = true;
    }

    /// Make the next `count` asset deletions fail with a provider error.
    pub fn fail_deletes(&self, count: u32) {
        self.state.lock().unwrap().delete_failures = count;
    }

    /// Record the persisted progress of `store` before each poll.
    pub fn observe(&self, store: Arc<MemoryStore>) {
        *self.observed_store.lock().unwrap() = Some(store);
    }

    pub fn start_calls(&self, video_id: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .start_calls
            .get(&VideoId::from(video_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn upload_checks(&self) -> u32 {
        self.state.lock().unwrap().upload_checks
    }

    pub fn deleted_videos(&self) -> Vec<VideoId> {
        self.state.lock().unwrap().deleted_videos.clone()
    }

    pub fn subtitle_content(&self, subtitle_id: &SubtitleId) -> Option<String> {
        self.state.lock().unwrap().subtitles.get(subtitle_id).cloned()
    }

    pub fn deleted_subtitles(&self) -> Vec<SubtitleId> {
        self.state.lock().unwrap().deleted_subtitles.clone()
    }

    pub fn thumbnail(&self, thumbnail_id: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().thumbnails.get(thumbnail_id).cloned()
    }

    pub fn deleted_thumbnails(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_thumbnails.clone()
    }

    pub fn progress_snapshots(&self) -> Vec<f64> {
        self.state.lock().unwrap().progress_snapshots.clone()
    }

    fn handles(video_id: &VideoId, kind: &str, jobs: usize) -> Vec<JobHandle> {
        (0..jobs)
            .map(|index| {
                JobHandle::new(format!("{}-{}-{}", video_id, kind, index)).with_payload(
                    serde_json::json!({ "video_id": video_id, "kind": kind, "index": index }),
                )
            })
            .collect()
    }
}

#[async_trait]
impl VideoBackend for FakeBackend {
    async fn get_upload_url(&self, _filename: &str) -> BackendResult<UploadGrant> {
        let mut state = self.state.lock().unwrap();
        state.next_grant += 1;
        let id = VideoId::from(format!("grant{:06}", state.next_grant));
        Ok(UploadGrant {
            url: format!("https://uploads.example.com/{}", id),
            id,
            method: UploadMethod::Put,
            expires_at: Utc::now() + ChronoDuration::hours(1),
        })
    }

    async fn check_upload(&self, video_id: &VideoId) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        state.upload_checks += 1;
        if state.uploaded.contains(video_id) {
            Ok(())
        } else {
            Err(BackendError::NotUploaded(video_id.to_string()))
        }
    }

    async fn start_transcoding(&self, video_id: &VideoId) -> BackendResult<Vec<JobHandle>> {
        let mut state = self.state.lock().unwrap();
        *state.start_calls.entry(video_id.clone()).or_default() += 1;
        let jobs = state.scripts.get(video_id).map_or(0, Vec::len);
        Ok(Self::handles(video_id, "full", jobs))
    }

    async fn check_progress(&self, job: &JobHandle) -> BackendResult<JobProgress> {
        let store = self.observed_store.lock().unwrap().clone();
        let video_id = VideoId::from(job.payload["video_id"].as_str().unwrap_or_default());
        if let Some(store) = store {
            if let Some(state) = store.get_processing_state(&video_id).await.unwrap() {
                self.state
                    .lock()
                    .unwrap()
                    .progress_snapshots
                    .push(state.progress);
            }
        }

        let mut state = self.state.lock().unwrap();
        let index = job.payload["index"].as_u64().unwrap_or_default() as usize;
        let scripts = if job.payload["kind"] == "additional" {
            &mut state.additional_scripts
        } else {
            &mut state.scripts
        };
        let steps = scripts
            .get_mut(&video_id)
            .and_then(|jobs| jobs.get_mut(index))
            .ok_or_else(|| BackendError::provider("unknown job"))?;
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        };

        match step.unwrap_or(Step::Done) {
            Step::Progress(percent) => Ok(JobProgress::running(percent)),
            Step::Done => Ok(JobProgress::done()),
            Step::Fail(message) => Err(BackendError::transcoding_failed(message)),
            Step::Error(message) => Err(BackendError::provider(message)),
        }
    }

    async fn list_formats(&self, video_id: &VideoId) -> BackendResult<Vec<FormatInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .formats
            .get(video_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn start_additional_transcoding(&self, video_id: &VideoId) -> BackendResult<Vec<JobHandle>> {
        let state = self.state.lock().unwrap();
        let jobs = state.additional_scripts.get(video_id).map_or(0, Vec::len);
        Ok(Self::handles(video_id, "additional", jobs))
    }

    async fn list_additional_formats(&self, video_id: &VideoId) -> BackendResult<Vec<FormatInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .additional_formats
            .get(video_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_video(&self, video_id: &VideoId) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.delete_failures > 0 {
            state.delete_failures -= 1;
            return Err(BackendError::provider("storage unavailable"));
        }
        state.deleted_videos.push(video_id.clone());
        Ok(())
    }

    async fn upload_subtitle(
        &self,
        _video_id: &VideoId,
        subtitle_id: &SubtitleId,
        _language: &str,
        content: &str,
    ) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_subtitle_upload {
            return Err(BackendError::provider("bucket unavailable"));
        }
        state.subtitles.insert(subtitle_id.clone(), content.to_string());
        Ok(())
    }

    async fn delete_subtitle(&self, _video_id: &VideoId, subtitle_id: &SubtitleId) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        state.subtitles.remove(subtitle_id);
        state.deleted_subtitles.push(subtitle_id.clone());
        Ok(())
    }

    async fn upload_thumbnail(&self, _video_id: &VideoId, thumbnail_id: &str, image: &[u8]) -> BackendResult<()> {
        self.state
            .lock()
            .unwrap()
            .thumbnails
            .insert(thumbnail_id.to_string(), image.to_vec());
        Ok(())
    }

    async fn delete_thumbnail(&self, _video_id: &VideoId, thumbnail_id: &str) -> BackendResult<()> {
        self.state
            .lock()
            .unwrap()
            .deleted_thumbnails
            .push(thumbnail_id.to_string());
        Ok(())
    }

    fn video_url(&self, video_id: &VideoId, format_name: &str) -> String {
        format!("https://cdn.example.com/{}/{}.mp4", video_id, format_name)
    }

    fn subtitle_url(&self, video_id: &VideoId, subtitle_id: &SubtitleId, language: &str) -> String {
        format!("https://cdn.example.com/{}/{}.{}.vtt", video_id, subtitle_id, language)
    }

    fn thumbnail_url(&self, video_id: &VideoId, thumbnail_id: &str) -> String {
        format!("https://cdn.example.com/{}/{}.jpg", video_id, thumbnail_id)
    }
}

/// Dispatcher that records tasks instead of queueing them.
#[derive(Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<QueueJob>>,
}

impl RecordingDispatcher {
    pub fn jobs(&self) -> Vec<QueueJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn transcode_dispatches(&self, video_id: &str) -> usize {
        self.jobs()
            .iter()
            .filter(|job| {
                matches!(job, QueueJob::TranscodeVideo(j) if j.video_id.as_str() == video_id)
            })
            .count()
    }

    pub fn monitor_dispatches(&self) -> usize {
        self.jobs()
            .iter()
            .filter(|job| matches!(job, QueueJob::MonitorUpload(_)))
            .count()
    }
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: QueueJob) -> QueueResult<bool> {
        self.jobs.lock().unwrap().push(job);
        Ok(true)
    }
}

/// In-memory pipeline with handles on every fake.
pub struct Harness {
    pub ctx: Arc<PipelineContext>,
    pub store: Arc<MemoryStore>,
    pub backend: Arc<FakeBackend>,
    pub locks: Arc<MemoryLockManager>,
    pub cache: Arc<MemoryResponseCache>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        lock_poll_interval: Duration::from_millis(10),
        transcode_poll_interval: Duration::from_millis(10),
        backend_delete_retries: 3,
        thumbnails_size: 64,
        ..WorkerConfig::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: WorkerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(FakeBackend::new());
        let locks = Arc::new(MemoryLockManager::new().with_poll_interval(config.lock_poll_interval));
        let cache = Arc::new(MemoryResponseCache::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());

        let ctx = PipelineContext::new(
            config,
            store.clone(),
            backend.clone(),
            locks.clone(),
            cache.clone(),
            dispatcher.clone(),
        );

        Self {
            ctx,
            store,
            backend,
            locks,
            cache,
            dispatcher,
        }
    }
}

pub fn formats(names: &[(&str, f64)]) -> Vec<FormatInfo> {
    names
        .iter()
        .map(|(name, bitrate)| FormatInfo::new(*name, *bitrate))
        .collect()
}
