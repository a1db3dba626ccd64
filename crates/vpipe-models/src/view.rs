//! Rendered read views.
//!
//! These are the payloads served to clients and stored in the response
//! cache. Urls are resolved by the backend at render time.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::format::VideoFormat;
use crate::processing::{ProcessingState, ProcessingStatus};
use crate::subtitle::Subtitle;
use crate::video::VideoId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingView {
    pub status: ProcessingStatus,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
}

impl From<&ProcessingState> for ProcessingView {
    fn from(state: &ProcessingState) -> Self {
        Self {
            status: state.status,
            progress: state.progress,
            started_at: state.started_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleView {
    pub id: String,
    pub language: String,
    pub video_id: VideoId,
    pub url: String,
}

impl SubtitleView {
    pub fn new(subtitle: &Subtitle, url: String) -> Self {
        Self {
            id: subtitle.public_id.to_string(),
            language: subtitle.language.clone(),
            video_id: subtitle.video_id.clone(),
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormatView {
    pub name: String,
    pub url: String,
    pub bitrate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<String>,
}

impl FormatView {
    pub fn new(format: &VideoFormat, url: String) -> Self {
        Self {
            name: format.name.clone(),
            url,
            bitrate: format.bitrate,
            width: format.width,
            height: format.height,
            duration_millis: format.duration_millis,
            file_size: format.file_size,
            frame_rate: format.frame_rate.clone(),
        }
    }
}

/// Full client view of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoView {
    pub id: VideoId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessingView>,
    #[serde(default)]
    pub subtitles: Vec<SubtitleView>,
    #[serde(default)]
    pub formats: Vec<FormatView>,
    /// Thumbnail url, empty when the backend has none
    #[serde(default)]
    pub thumbnail: String,
}
