//! Processing state of a video.
//!
//! Every video owns exactly one processing state. A transcoding attempt
//! moves it `pending -> processing -> success | failed`; `restart` is set
//! from outside to request a new attempt.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::video::VideoId;

/// Maximum stored length (in characters) of the failure message.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Video processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Waiting for (or at the very start of) a transcoding attempt
    #[default]
    Pending,
    /// Transcoding jobs are running
    Processing,
    /// The last attempt failed
    Failed,
    /// The last attempt succeeded
    Success,
    /// An operator asked for a new attempt
    Restart,
}

impl ProcessingStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Success => "success",
            ProcessingStatus::Restart => "restart",
        }
    }

    /// Check if this is a terminal state of an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Success | ProcessingStatus::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "failed" => Ok(ProcessingStatus::Failed),
            "success" => Ok(ProcessingStatus::Success),
            "restart" => Ok(ProcessingStatus::Restart),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

/// Processing state of one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingState {
    /// Owning video
    pub video_id: VideoId,
    /// Current status
    pub status: ProcessingStatus,
    /// Progress percentage (0-100)
    pub progress: f64,
    /// Start of the current attempt
    pub started_at: DateTime<Utc>,
    /// Failure details, empty unless the attempt failed
    #[serde(default)]
    pub message: String,
}

impl ProcessingState {
    /// Create the initial state of a freshly created video.
    pub fn new(video_id: VideoId, now: DateTime<Utc>) -> Self {
        Self {
            video_id,
            status: ProcessingStatus::Pending,
            progress: 0.0,
            started_at: now,
            message: String::new(),
        }
    }

    /// Reset the state for a new attempt.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) {
        self.status = ProcessingStatus::Pending;
        self.progress = 0.0;
        self.started_at = now;
        self.message.clear();
    }

    /// Record progress of the running attempt.
    ///
    /// Progress is clamped to [0, 100] and never moves backwards within
    /// an attempt.
    pub fn set_progress(&mut self, progress: f64) {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.status = ProcessingStatus::Processing;
        self.progress = self.progress.max(progress);
    }

    /// Mark the attempt as successful.
    pub fn succeed(&mut self) {
        self.status = ProcessingStatus::Success;
        self.message.clear();
    }

    /// Mark the attempt as failed with an error message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ProcessingStatus::Failed;
        self.message = truncate_message(message.into());
    }
}

/// Truncate a failure message to [`MAX_MESSAGE_LEN`] characters.
pub fn truncate_message(message: String) -> String {
    if message.chars().count() <= MAX_MESSAGE_LEN {
        message
    } else {
        message.chars().take(MAX_MESSAGE_LEN).collect()
    }
}
