//! Repository traits for store operations.

pub mod formats;
pub mod playlists;
pub mod processing;
pub mod subtitles;
pub mod upload_urls;
pub mod videos;

pub use formats::FormatRepo;
pub use playlists::PlaylistRepo;
pub use processing::ProcessingRepo;
pub use subtitles::SubtitleRepo;
pub use upload_urls::UploadUrlRepo;
pub use videos::VideoRepo;
