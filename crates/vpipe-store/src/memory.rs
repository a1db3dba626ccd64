//! In-memory store implementation.
//!
//! Implements the same repository contracts as [`PostgresStore`](crate::PostgresStore)
//! behind a single mutex. Used by tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;
use vpipe_models::{
    FormatInfo, NewVideo, Playlist, PlaylistId, ProcessingState, ProcessingStatus, Subtitle,
    SubtitleId, UploadCheckPolicy, Video, VideoFormat, VideoId, VideoUploadUrl,
};

use crate::error::{StoreError, StoreResult};
use crate::repos::{
    FormatRepo, PlaylistRepo, ProcessingRepo, SubtitleRepo, UploadUrlRepo, VideoRepo,
};
use crate::store::VideoStore;

#[derive(Default)]
struct Tables {
    videos: HashMap<VideoId, Video>,
    processing: HashMap<VideoId, ProcessingState>,
    /// Keyed by format id, which preserves creation order
    formats: BTreeMap<i64, VideoFormat>,
    next_format_id: i64,
    subtitles: Vec<Subtitle>,
    upload_urls: HashMap<VideoId, VideoUploadUrl>,
    playlists: HashMap<PlaylistId, Playlist>,
    memberships: BTreeSet<(PlaylistId, VideoId)>,
}

impl Tables {
    fn insert_video(&mut self, video: Video, now: DateTime<Utc>) {
        let id = video.public_id.clone();
        self.processing
            .insert(id.clone(), ProcessingState::new(id.clone(), now));
        self.videos.insert(id, video);
    }
}

/// In-memory video store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoStore for MemoryStore {
    async fn migrate(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl VideoRepo for MemoryStore {
    async fn get_or_create_video(
        &self,
        video: &NewVideo,
        now: DateTime<Utc>,
    ) -> StoreResult<(Video, bool)> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.videos.get(&video.public_id) {
            return Ok((existing.clone(), false));
        }
        let created = video.clone().into_video(now);
        tables.insert_video(created.clone(), now);
        Ok((created, true))
    }

    async fn create_video(&self, video: &NewVideo, now: DateTime<Utc>) -> StoreResult<Video> {
        let mut tables = self.tables.lock().await;
        if tables.videos.contains_key(&video.public_id) {
            return Err(StoreError::AlreadyExists(format!(
                "video {}",
                video.public_id
            )));
        }
        let created = video.clone().into_video(now);
        tables.insert_video(created.clone(), now);
        Ok(created)
    }

    async fn get_video(&self, video_id: &VideoId) -> StoreResult<Option<Video>> {
        Ok(self.tables.lock().await.videos.get(video_id).cloned())
    }

    async fn list_videos_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Video>> {
        let tables = self.tables.lock().await;
        let mut videos: Vec<Video> = tables
            .videos
            .values()
            .filter(|v| v.owner_id == owner_id)
            .cloned()
            .collect();
        videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(videos)
    }

    async fn set_thumbnail_id(&self, video_id: &VideoId, thumbnail_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.videos.get_mut(video_id) {
            Some(video) => {
                video.thumbnail_id = thumbnail_id.to_string();
                true
            }
            None => false,
        })
    }

    async fn delete_video(&self, video_id: &VideoId) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        if tables.videos.remove(video_id).is_none() {
            return Ok(false);
        }
        tables.processing.remove(video_id);
        tables.formats.retain(|_, f| &f.video_id != video_id);
        tables.subtitles.retain(|s| &s.video_id != video_id);
        tables.memberships.retain(|(_, v)| v != video_id);
        Ok(true)
    }
}

#[async_trait]
impl ProcessingRepo for MemoryStore {
    async fn get_processing_state(
        &self,
        video_id: &VideoId,
    ) -> StoreResult<Option<ProcessingState>> {
        Ok(self.tables.lock().await.processing.get(video_id).cloned())
    }

    async fn save_processing_state(&self, state: &ProcessingState) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.processing.get_mut(&state.video_id) {
            Some(existing) => {
                *existing = state.clone();
                Ok(())
            }
            None => Err(StoreError::not_found(format!(
                "processing state {}",
                state.video_id
            ))),
        }
    }

    async fn request_restart(&self, video_id: &VideoId) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.processing.get_mut(video_id) {
            Some(state) => {
                state.status = ProcessingStatus::Restart;
                true
            }
            None => false,
        })
    }

    async fn claim_restarts(&self, limit: i64) -> StoreResult<Vec<VideoId>> {
        let mut tables = self.tables.lock().await;
        let mut candidates: Vec<&mut ProcessingState> = tables
            .processing
            .values_mut()
            .filter(|s| s.status == ProcessingStatus::Restart)
            .collect();
        candidates.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(candidates
            .into_iter()
            .take(limit)
            .map(|state| {
                state.status = ProcessingStatus::Pending;
                state.video_id.clone()
            })
            .collect())
    }
}

#[async_trait]
impl FormatRepo for MemoryStore {
    async fn delete_formats(&self, video_id: &VideoId) -> StoreResult<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.formats.len();
        tables.formats.retain(|_, f| &f.video_id != video_id);
        Ok((before - tables.formats.len()) as u64)
    }

    async fn create_format(
        &self,
        video_id: &VideoId,
        info: &FormatInfo,
    ) -> StoreResult<VideoFormat> {
        let mut tables = self.tables.lock().await;
        if !tables.videos.contains_key(video_id) {
            return Err(StoreError::not_found(format!("video {}", video_id)));
        }
        tables.next_format_id += 1;
        let format = VideoFormat::from_info(tables.next_format_id, video_id.clone(), info.clone());
        tables.formats.insert(format.id, format.clone());
        Ok(format)
    }

    async fn list_formats(&self, video_id: &VideoId) -> StoreResult<Vec<VideoFormat>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .formats
            .values()
            .filter(|f| &f.video_id == video_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SubtitleRepo for MemoryStore {
    async fn create_subtitle(
        &self,
        subtitle: &Subtitle,
        upload: BoxFuture<'_, anyhow::Result<()>>,
    ) -> StoreResult<()> {
        {
            let mut tables = self.tables.lock().await;
            if !tables.videos.contains_key(&subtitle.video_id) {
                return Err(StoreError::not_found(format!("video {}", subtitle.video_id)));
            }
            if tables
                .subtitles
                .iter()
                .any(|s| s.public_id == subtitle.public_id)
            {
                return Err(StoreError::AlreadyExists(format!(
                    "subtitle {}",
                    subtitle.public_id
                )));
            }
            tables.subtitles.push(subtitle.clone());
        }

        // The mutex is not held across the upload.
        if let Err(err) = upload.await {
            let mut tables = self.tables.lock().await;
            tables.subtitles.retain(|s| s.public_id != subtitle.public_id);
            return Err(StoreError::Aborted(err));
        }
        Ok(())
    }

    async fn get_subtitle(&self, subtitle_id: &SubtitleId) -> StoreResult<Option<Subtitle>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subtitles
            .iter()
            .find(|s| &s.public_id == subtitle_id)
            .cloned())
    }

    async fn list_subtitles(&self, video_id: &VideoId) -> StoreResult<Vec<Subtitle>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subtitles
            .iter()
            .filter(|s| &s.video_id == video_id)
            .cloned()
            .collect())
    }

    async fn delete_subtitle(&self, subtitle_id: &SubtitleId) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.subtitles.len();
        tables.subtitles.retain(|s| &s.public_id != subtitle_id);
        Ok(tables.subtitles.len() < before)
    }
}

#[async_trait]
impl UploadUrlRepo for MemoryStore {
    async fn create_upload_url(&self, url: &VideoUploadUrl) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.upload_urls.contains_key(&url.public_video_id) {
            return Err(StoreError::AlreadyExists(format!(
                "upload url {}",
                url.public_video_id
            )));
        }
        if let Some(playlist_id) = &url.playlist_id {
            if !tables.playlists.contains_key(playlist_id) {
                return Err(StoreError::not_found(format!("playlist {}", playlist_id)));
            }
        }
        tables
            .upload_urls
            .insert(url.public_video_id.clone(), url.clone());
        Ok(())
    }

    async fn get_upload_url(&self, video_id: &VideoId) -> StoreResult<Option<VideoUploadUrl>> {
        Ok(self.tables.lock().await.upload_urls.get(video_id).cloned())
    }

    async fn list_upload_urls_to_check(
        &self,
        policy: &UploadCheckPolicy,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<VideoUploadUrl>> {
        let tables = self.tables.lock().await;
        let mut urls: Vec<VideoUploadUrl> = tables
            .upload_urls
            .values()
            .filter(|url| policy.should_check(url, now))
            .cloned()
            .collect();
        urls.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        urls.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(urls)
    }

    async fn save_upload_check(
        &self,
        video_id: &VideoId,
        was_used: bool,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let url = tables
            .upload_urls
            .get_mut(video_id)
            .ok_or_else(|| StoreError::not_found(format!("upload url {}", video_id)))?;
        if was_used {
            url.mark_used(checked_at);
        } else {
            url.record_check(checked_at);
        }
        Ok(())
    }

    async fn claim_upload_url(
        &self,
        video_id: &VideoId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<VideoUploadUrl>> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.upload_urls.get_mut(video_id) {
            Some(url) if url.is_available(now) => {
                url.mark_used(now);
                Some(url.clone())
            }
            _ => None,
        })
    }
}

#[async_trait]
impl PlaylistRepo for MemoryStore {
    async fn create_playlist(&self, playlist: &Playlist) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.playlists.contains_key(&playlist.public_id) {
            return Err(StoreError::AlreadyExists(format!(
                "playlist {}",
                playlist.public_id
            )));
        }
        tables
            .playlists
            .insert(playlist.public_id.clone(), playlist.clone());
        Ok(())
    }

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> StoreResult<Option<Playlist>> {
        Ok(self.tables.lock().await.playlists.get(playlist_id).cloned())
    }

    async fn add_video_to_playlist(
        &self,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if !tables.playlists.contains_key(playlist_id) {
            return Err(StoreError::not_found(format!("playlist {}", playlist_id)));
        }
        if !tables.videos.contains_key(video_id) {
            return Err(StoreError::not_found(format!("video {}", video_id)));
        }
        tables
            .memberships
            .insert((playlist_id.clone(), video_id.clone()));
        Ok(())
    }

    async fn list_playlists_for_video(&self, video_id: &VideoId) -> StoreResult<Vec<Playlist>> {
        let tables = self.tables.lock().await;
        let mut playlists: Vec<Playlist> = tables
            .memberships
            .iter()
            .filter(|(_, v)| v == video_id)
            .filter_map(|(p, _)| tables.playlists.get(p).cloned())
            .collect();
        playlists.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(playlists)
    }
}
