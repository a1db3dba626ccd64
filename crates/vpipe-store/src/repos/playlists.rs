//! Playlist repository.

use async_trait::async_trait;
use vpipe_models::{Playlist, PlaylistId, VideoId};

use crate::error::StoreResult;

/// Repository for playlists and their memberships.
#[async_trait]
pub trait PlaylistRepo: Send + Sync {
    async fn create_playlist(&self, playlist: &Playlist) -> StoreResult<()>;

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> StoreResult<Option<Playlist>>;

    /// Attach a video to a playlist. Attaching twice is a no-op.
    async fn add_video_to_playlist(
        &self,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> StoreResult<()>;

    /// List the playlists containing a video.
    async fn list_playlists_for_video(&self, video_id: &VideoId) -> StoreResult<Vec<Playlist>>;
}
