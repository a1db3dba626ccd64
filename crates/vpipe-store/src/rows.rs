//! Database rows mapping to the store schema.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use vpipe_models::{
    Playlist, PlaylistId, ProcessingState, Subtitle, SubtitleId, Video, VideoFormat, VideoId,
    VideoUploadUrl,
};

use crate::error::StoreError;

#[derive(Debug, Clone, FromRow)]
pub struct VideoRow {
    pub public_id: String,
    pub title: String,
    pub storage_path: Option<String>,
    pub owner_id: String,
    pub thumbnail_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<VideoRow> for Video {
    fn from(row: VideoRow) -> Self {
        Video {
            public_id: VideoId(row.public_id),
            title: row.title,
            storage_path: row.storage_path,
            owner_id: row.owner_id,
            thumbnail_id: row.thumbnail_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProcessingStateRow {
    pub video_id: String,
    pub status: String,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    pub message: String,
}

impl TryFrom<ProcessingStateRow> for ProcessingState {
    type Error = StoreError;

    fn try_from(row: ProcessingStateRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("processing state {}: {}", row.video_id, e)))?;
        Ok(ProcessingState {
            video_id: VideoId(row.video_id),
            status,
            progress: row.progress,
            started_at: row.started_at,
            message: row.message,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VideoFormatRow {
    pub id: i64,
    pub video_id: String,
    pub name: String,
    pub bitrate: f64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_millis: Option<i64>,
    pub file_size: Option<i64>,
    pub frame_rate: Option<String>,
}

impl From<VideoFormatRow> for VideoFormat {
    fn from(row: VideoFormatRow) -> Self {
        VideoFormat {
            id: row.id,
            video_id: VideoId(row.video_id),
            name: row.name,
            bitrate: row.bitrate,
            width: row.width.and_then(|v| u32::try_from(v).ok()),
            height: row.height.and_then(|v| u32::try_from(v).ok()),
            duration_millis: row.duration_millis.and_then(|v| u64::try_from(v).ok()),
            file_size: row.file_size.and_then(|v| u64::try_from(v).ok()),
            frame_rate: row.frame_rate,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SubtitleRow {
    pub public_id: String,
    pub video_id: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl From<SubtitleRow> for Subtitle {
    fn from(row: SubtitleRow) -> Self {
        Subtitle {
            public_id: SubtitleId(row.public_id),
            video_id: VideoId(row.video_id),
            language: row.language,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UploadUrlRow {
    pub public_video_id: String,
    pub filename: String,
    pub expires_at: DateTime<Utc>,
    pub was_used: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub owner_id: String,
    pub playlist_id: Option<String>,
    pub origin: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UploadUrlRow> for VideoUploadUrl {
    fn from(row: UploadUrlRow) -> Self {
        VideoUploadUrl {
            public_video_id: VideoId(row.public_video_id),
            filename: row.filename,
            expires_at: row.expires_at,
            was_used: row.was_used,
            last_checked: row.last_checked,
            owner_id: row.owner_id,
            playlist_id: row.playlist_id.map(PlaylistId),
            origin: row.origin,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PlaylistRow {
    pub public_id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<PlaylistRow> for Playlist {
    fn from(row: PlaylistRow) -> Self {
        Playlist {
            public_id: PlaylistId(row.public_id),
            name: row.name,
            owner_id: row.owner_id,
            created_at: row.created_at,
        }
    }
}
