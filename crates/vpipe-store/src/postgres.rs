//! PostgreSQL-based store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use vpipe_models::{
    FormatInfo, NewVideo, Playlist, PlaylistId, ProcessingState, ProcessingStatus, Subtitle,
    SubtitleId, UploadCheckPolicy, Video, VideoFormat, VideoId, VideoUploadUrl,
};

use crate::error::{StoreError, StoreResult};
use crate::repos::{
    FormatRepo, PlaylistRepo, ProcessingRepo, SubtitleRepo, UploadUrlRepo, VideoRepo,
};
use crate::rows::{
    PlaylistRow, ProcessingStateRow, SubtitleRow, UploadUrlRow, VideoFormatRow, VideoRow,
};
use crate::store::VideoStore;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based video store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect from a connection URL and apply the schema.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> StoreResult<Self> {
        let mut opts = PgConnectOptions::from_str(url)?;
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl VideoStore for PostgresStore {
    async fn migrate(&self) -> StoreResult<()> {
        // Prepared statements cannot hold several commands.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const INSERT_VIDEO: &str = r#"
    INSERT INTO videos (public_id, title, storage_path, owner_id, thumbnail_id, created_at)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

const INSERT_VIDEO_IF_ABSENT: &str = r#"
    INSERT INTO videos (public_id, title, storage_path, owner_id, thumbnail_id, created_at)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (public_id) DO NOTHING
    RETURNING *
"#;

const INSERT_PROCESSING_STATE: &str = r#"
    INSERT INTO processing_states (video_id, status, progress, started_at, message)
    VALUES ($1, $2, $3, $4, $5)
"#;

async fn insert_processing_state(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    state: &ProcessingState,
) -> StoreResult<()> {
    sqlx::query(INSERT_PROCESSING_STATE)
        .bind(state.video_id.as_str())
        .bind(state.status.as_str())
        .bind(state.progress)
        .bind(state.started_at)
        .bind(&state.message)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl VideoRepo for PostgresStore {
    async fn get_or_create_video(
        &self,
        video: &NewVideo,
        now: DateTime<Utc>,
    ) -> StoreResult<(Video, bool)> {
        let candidate = video.clone().into_video(now);
        let mut tx = self.pool.begin().await?;

        // A concurrent insert of the same id blocks here until it commits,
        // then DO NOTHING returns no row.
        let inserted = sqlx::query_as::<_, VideoRow>(INSERT_VIDEO_IF_ABSENT)
        .bind(candidate.public_id.as_str())
        .bind(&candidate.title)
        .bind(&candidate.storage_path)
        .bind(&candidate.owner_id)
        .bind(&candidate.thumbnail_id)
        .bind(candidate.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        let result = match inserted {
            Some(row) => {
                insert_processing_state(&mut tx, &ProcessingState::new(candidate.public_id, now))
                    .await?;
                (Video::from(row), true)
            }
            None => {
                let row =
                    sqlx::query_as::<_, VideoRow>("SELECT * FROM videos WHERE public_id = $1")
                        .bind(video.public_id.as_str())
                        .fetch_one(&mut *tx)
                        .await?;
                (Video::from(row), false)
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    async fn create_video(&self, video: &NewVideo, now: DateTime<Utc>) -> StoreResult<Video> {
        let video = video.clone().into_video(now);
        let mut tx = self.pool.begin().await?;

        sqlx::query(INSERT_VIDEO)
            .bind(video.public_id.as_str())
            .bind(&video.title)
            .bind(&video.storage_path)
            .bind(&video.owner_id)
            .bind(&video.thumbnail_id)
            .bind(video.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_write(e, format!("video {}", video.public_id)))?;

        insert_processing_state(&mut tx, &ProcessingState::new(video.public_id.clone(), now))
            .await?;

        tx.commit().await?;
        Ok(video)
    }

    async fn get_video(&self, video_id: &VideoId) -> StoreResult<Option<Video>> {
        let row = sqlx::query_as::<_, VideoRow>("SELECT * FROM videos WHERE public_id = $1")
            .bind(video_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Video::from))
    }

    async fn list_videos_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Video>> {
        let rows = sqlx::query_as::<_, VideoRow>(
            "SELECT * FROM videos WHERE owner_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Video::from).collect())
    }

    async fn set_thumbnail_id(&self, video_id: &VideoId, thumbnail_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE videos SET thumbnail_id = $2 WHERE public_id = $1")
            .bind(video_id.as_str())
            .bind(thumbnail_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_write(e, format!("thumbnail {}", thumbnail_id)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_video(&self, video_id: &VideoId) -> StoreResult<bool> {
        // Owned rows go with ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM videos WHERE public_id = $1")
            .bind(video_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ProcessingRepo for PostgresStore {
    async fn get_processing_state(
        &self,
        video_id: &VideoId,
    ) -> StoreResult<Option<ProcessingState>> {
        let row = sqlx::query_as::<_, ProcessingStateRow>(
            "SELECT * FROM processing_states WHERE video_id = $1",
        )
        .bind(video_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProcessingState::try_from).transpose()
    }

    async fn save_processing_state(&self, state: &ProcessingState) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE processing_states
               SET status = $2, progress = $3, started_at = $4, message = $5
             WHERE video_id = $1
            "#,
        )
        .bind(state.video_id.as_str())
        .bind(state.status.as_str())
        .bind(state.progress)
        .bind(state.started_at)
        .bind(&state.message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!(
                "processing state {}",
                state.video_id
            )));
        }
        Ok(())
    }

    async fn request_restart(&self, video_id: &VideoId) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE processing_states SET status = $2 WHERE video_id = $1")
            .bind(video_id.as_str())
            .bind(ProcessingStatus::Restart.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn claim_restarts(&self, limit: i64) -> StoreResult<Vec<VideoId>> {
        // Concurrent sweeps never claim the same row
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE processing_states
               SET status = $2
             WHERE video_id IN (
                   SELECT video_id FROM processing_states
                    WHERE status = $1
                    ORDER BY started_at
                    LIMIT $3
                    FOR UPDATE SKIP LOCKED
             )
            RETURNING video_id
            "#,
        )
        .bind(ProcessingStatus::Restart.as_str())
        .bind(ProcessingStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(VideoId).collect())
    }
}

#[async_trait]
impl FormatRepo for PostgresStore {
    async fn delete_formats(&self, video_id: &VideoId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM video_formats WHERE video_id = $1")
            .bind(video_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_format(
        &self,
        video_id: &VideoId,
        info: &FormatInfo,
    ) -> StoreResult<VideoFormat> {
        let row = sqlx::query_as::<_, VideoFormatRow>(
            r#"
            INSERT INTO video_formats (
                video_id, name, bitrate, width, height, duration_millis, file_size, frame_rate
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(video_id.as_str())
        .bind(&info.name)
        .bind(info.bitrate)
        .bind(info.width.and_then(|v| i32::try_from(v).ok()))
        .bind(info.height.and_then(|v| i32::try_from(v).ok()))
        .bind(info.duration_millis.and_then(|v| i64::try_from(v).ok()))
        .bind(info.file_size.and_then(|v| i64::try_from(v).ok()))
        .bind(&info.frame_rate)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, format!("format of video {}", video_id)))?;
        Ok(VideoFormat::from(row))
    }

    async fn list_formats(&self, video_id: &VideoId) -> StoreResult<Vec<VideoFormat>> {
        let rows = sqlx::query_as::<_, VideoFormatRow>(
            "SELECT * FROM video_formats WHERE video_id = $1 ORDER BY id",
        )
        .bind(video_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(VideoFormat::from).collect())
    }
}

#[async_trait]
impl SubtitleRepo for PostgresStore {
    async fn create_subtitle(
        &self,
        subtitle: &Subtitle,
        upload: BoxFuture<'_, anyhow::Result<()>>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO subtitles (public_id, video_id, language, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(subtitle.public_id.as_str())
        .bind(subtitle.video_id.as_str())
        .bind(&subtitle.language)
        .bind(subtitle.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, format!("subtitle {}", subtitle.public_id)))?;

        if let Err(err) = upload.await {
            tx.rollback().await?;
            return Err(StoreError::Aborted(err));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_subtitle(&self, subtitle_id: &SubtitleId) -> StoreResult<Option<Subtitle>> {
        let row = sqlx::query_as::<_, SubtitleRow>("SELECT * FROM subtitles WHERE public_id = $1")
            .bind(subtitle_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Subtitle::from))
    }

    async fn list_subtitles(&self, video_id: &VideoId) -> StoreResult<Vec<Subtitle>> {
        let rows = sqlx::query_as::<_, SubtitleRow>(
            "SELECT * FROM subtitles WHERE video_id = $1 ORDER BY created_at, public_id",
        )
        .bind(video_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Subtitle::from).collect())
    }

    async fn delete_subtitle(&self, subtitle_id: &SubtitleId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM subtitles WHERE public_id = $1")
            .bind(subtitle_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UploadUrlRepo for PostgresStore {
    async fn create_upload_url(&self, url: &VideoUploadUrl) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO video_upload_urls (
                public_video_id, filename, expires_at, was_used, last_checked,
                owner_id, playlist_id, origin, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(url.public_video_id.as_str())
        .bind(&url.filename)
        .bind(url.expires_at)
        .bind(url.was_used)
        .bind(url.last_checked)
        .bind(&url.owner_id)
        .bind(url.playlist_id.as_ref().map(|p| p.as_str()))
        .bind(&url.origin)
        .bind(url.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, format!("upload url {}", url.public_video_id)))?;
        Ok(())
    }

    async fn get_upload_url(&self, video_id: &VideoId) -> StoreResult<Option<VideoUploadUrl>> {
        let row = sqlx::query_as::<_, UploadUrlRow>(
            "SELECT * FROM video_upload_urls WHERE public_video_id = $1",
        )
        .bind(video_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(VideoUploadUrl::from))
    }

    async fn list_upload_urls_to_check(
        &self,
        policy: &UploadCheckPolicy,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<VideoUploadUrl>> {
        let rows = sqlx::query_as::<_, UploadUrlRow>(
            r#"
            SELECT * FROM video_upload_urls
             WHERE was_used = FALSE
               AND expires_at > $1
               AND (last_checked IS NULL OR last_checked < $2)
             ORDER BY expires_at
             LIMIT $3
            "#,
        )
        .bind(now - policy.grace_period)
        .bind(now - policy.min_check_interval)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(VideoUploadUrl::from).collect())
    }

    async fn save_upload_check(
        &self,
        video_id: &VideoId,
        was_used: bool,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE video_upload_urls
               SET was_used = was_used OR $2,
                   last_checked = GREATEST(COALESCE(last_checked, $3), $3)
             WHERE public_video_id = $1
            "#,
        )
        .bind(video_id.as_str())
        .bind(was_used)
        .bind(checked_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("upload url {}", video_id)));
        }
        Ok(())
    }

    async fn claim_upload_url(
        &self,
        video_id: &VideoId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<VideoUploadUrl>> {
        let row = sqlx::query_as::<_, UploadUrlRow>(
            r#"
            UPDATE video_upload_urls
               SET was_used = TRUE,
                   last_checked = GREATEST(COALESCE(last_checked, $2), $2)
             WHERE public_video_id = $1 AND was_used = FALSE AND expires_at > $2
            RETURNING *
            "#,
        )
        .bind(video_id.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(VideoUploadUrl::from))
    }
}

#[async_trait]
impl PlaylistRepo for PostgresStore {
    async fn create_playlist(&self, playlist: &Playlist) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO playlists (public_id, name, owner_id, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(playlist.public_id.as_str())
        .bind(&playlist.name)
        .bind(&playlist.owner_id)
        .bind(playlist.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, format!("playlist {}", playlist.public_id)))?;
        Ok(())
    }

    async fn get_playlist(&self, playlist_id: &PlaylistId) -> StoreResult<Option<Playlist>> {
        let row = sqlx::query_as::<_, PlaylistRow>("SELECT * FROM playlists WHERE public_id = $1")
            .bind(playlist_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Playlist::from))
    }

    async fn add_video_to_playlist(
        &self,
        playlist_id: &PlaylistId,
        video_id: &VideoId,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO playlist_videos (playlist_id, video_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(playlist_id.as_str())
        .bind(video_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            StoreError::from_write(e, format!("playlist {} video {}", playlist_id, video_id))
        })?;
        Ok(())
    }

    async fn list_playlists_for_video(&self, video_id: &VideoId) -> StoreResult<Vec<Playlist>> {
        let rows = sqlx::query_as::<_, PlaylistRow>(
            r#"
            SELECT p.* FROM playlists p
              JOIN playlist_videos pv ON pv.playlist_id = p.public_id
             WHERE pv.video_id = $1
             ORDER BY p.name
            "#,
        )
        .bind(video_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Playlist::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_skip_comments() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        assert!(statements.iter().all(|s| !s.is_empty()));
        assert!(statements
            .iter()
            .any(|s| s.contains("CREATE TABLE IF NOT EXISTS processing_states")));
        assert!(statements
            .iter()
            .all(|s| s.lines().any(|l| !l.trim_start().starts_with("--"))));
    }

    #[test]
    fn test_schema_statement_splitting() {
        let schema = "-- header\n\nCREATE TABLE a (id INT);\n-- only a comment\n;\nCREATE TABLE b (id INT);\n";
        let statements = postgres_schema_statements(schema);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("CREATE TABLE a (id INT)"));
        assert_eq!(statements[1], "CREATE TABLE b (id INT)");
    }
}
