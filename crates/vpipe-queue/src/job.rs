//! Task types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use vpipe_models::VideoId;

/// Unique identifier of a queued task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task checking whether a file was uploaded on an upload url.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorUploadJob {
    pub job_id: TaskId,
    /// Public video id of the upload url
    pub video_id: VideoId,
    /// Block on a concurrent check instead of returning immediately
    #[serde(default)]
    pub wait: bool,
    pub created_at: DateTime<Utc>,
}

impl MonitorUploadJob {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            job_id: TaskId::new(),
            video_id,
            wait: false,
            created_at: Utc::now(),
        }
    }

    pub fn waiting(mut self) -> Self {
        self.wait = true;
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("monitor_upload:{}", self.video_id)
    }
}

/// How a transcoding run treats existing renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeMode {
    /// Replace every rendition; wipe assets on failure
    #[default]
    Full,
    /// Add renditions on top of the existing ones
    Additional,
}

impl TranscodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeMode::Full => "full",
            TranscodeMode::Additional => "additional",
        }
    }
}

impl fmt::Display for TranscodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task running the transcoding state machine of one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeVideoJob {
    pub job_id: TaskId,
    pub video_id: VideoId,
    #[serde(default)]
    pub mode: TranscodeMode,
    pub created_at: DateTime<Utc>,
}

impl TranscodeVideoJob {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            job_id: TaskId::new(),
            video_id,
            mode: TranscodeMode::Full,
            created_at: Utc::now(),
        }
    }

    pub fn with_mode(mut self, mode: TranscodeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("transcode:{}:{}", self.video_id, self.mode)
    }
}

/// Generic task wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    MonitorUpload(MonitorUploadJob),
    TranscodeVideo(TranscodeVideoJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &TaskId {
        match self {
            QueueJob::MonitorUpload(j) => &j.job_id,
            QueueJob::TranscodeVideo(j) => &j.job_id,
        }
    }

    pub fn video_id(&self) -> &VideoId {
        match self {
            QueueJob::MonitorUpload(j) => &j.video_id,
            QueueJob::TranscodeVideo(j) => &j.video_id,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::MonitorUpload(j) => j.idempotency_key(),
            QueueJob::TranscodeVideo(j) => j.idempotency_key(),
        }
    }

    /// Short task name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::MonitorUpload(_) => "monitor_upload",
            QueueJob::TranscodeVideo(_) => "transcode_video",
        }
    }
}

impl From<MonitorUploadJob> for QueueJob {
    fn from(job: MonitorUploadJob) -> Self {
        QueueJob::MonitorUpload(job)
    }
}

impl From<TranscodeVideoJob> for QueueJob {
    fn from(job: TranscodeVideoJob) -> Self {
        QueueJob::TranscodeVideo(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_job_serializes_with_type_tag() {
        let job = QueueJob::from(TranscodeVideoJob::new(VideoId::from("abc123")));
        let json: serde_json::Value = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "transcode_video");
        assert_eq!(json["video_id"], "abc123");
        assert_eq!(json["mode"], "full");
    }

    #[test]
    fn queue_job_defaults_missing_fields() {
        let json = r#"{"type":"monitor_upload","job_id":"t1","video_id":"abc123","created_at":"2024-01-01T00:00:00Z"}"#;
        let job: QueueJob = serde_json::from_str(json).unwrap();
        match job {
            QueueJob::MonitorUpload(j) => {
                assert!(!j.wait);
                assert_eq!(j.video_id.as_str(), "abc123");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn idempotency_keys_are_per_video_and_mode() {
        let id = VideoId::from("abc123");
        let full = QueueJob::from(TranscodeVideoJob::new(id.clone()));
        let extra = QueueJob::from(TranscodeVideoJob::new(id.clone()).with_mode(TranscodeMode::Additional));
        let monitor = QueueJob::from(MonitorUploadJob::new(id));

        assert_eq!(full.idempotency_key(), "transcode:abc123:full");
        assert_eq!(extra.idempotency_key(), "transcode:abc123:additional");
        assert_eq!(monitor.idempotency_key(), "monitor_upload:abc123");
        assert_eq!(monitor.kind(), "monitor_upload");
    }
}
