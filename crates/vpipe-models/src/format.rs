//! Transcoded renditions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::video::VideoId;

/// Rendition metadata reported by the backend once transcoding is done.
///
/// Only `name` and `bitrate` are mandatory; backends fill in the rest when
/// they know it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormatInfo {
    pub name: String,
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

impl FormatInfo {
    pub fn new(name: impl Into<String>, bitrate: f64) -> Self {
        Self {
            name: name.into(),
            bitrate,
            width: None,
            height: None,
            duration_millis: None,
            file_size: None,
            frame_rate: None,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// Persisted rendition of a video. Formats are ordered by `id`
/// (creation order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoFormat {
    pub id: i64,
    pub video_id: VideoId,
    pub name: String,
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

impl VideoFormat {
    pub fn from_info(id: i64, video_id: VideoId, info: FormatInfo) -> Self {
        Self {
            id,
            video_id,
            name: info.name,
            bitrate: info.bitrate,
            width: info.width,
            height: info.height,
            duration_millis: info.duration_millis,
            file_size: info.file_size,
            frame_rate: info.frame_rate,
        }
    }
}
