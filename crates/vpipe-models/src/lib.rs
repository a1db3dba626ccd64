//! Shared data models for the video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Videos and their processing state
//! - Upload grants (video upload urls)
//! - Transcoded renditions (video formats)
//! - Subtitles and playlists
//! - Cached read views

pub mod error;
pub mod format;
pub mod playlist;
pub mod processing;
pub mod subtitle;
pub mod upload;
pub mod utils;
pub mod video;
pub mod view;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use format::{FormatInfo, VideoFormat};
pub use playlist::{Playlist, PlaylistId};
pub use processing::{ProcessingState, ProcessingStatus, MAX_MESSAGE_LEN};
pub use subtitle::{NewSubtitle, Subtitle, SubtitleId};
pub use upload::{UploadCheckPolicy, UploadGrant, UploadMethod, VideoUploadUrl};
pub use utils::random_id;
pub use video::{NewVideo, Video, VideoId};
pub use view::{FormatView, ProcessingView, SubtitleView, VideoView};
