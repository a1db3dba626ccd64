//! Persistent store for the video pipeline.
//!
//! This crate is the record of truth for:
//! - Videos and their processing states
//! - Upload grants
//! - Transcoded formats and subtitles
//! - Playlists and memberships

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repos;
pub mod rows;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use repos::{FormatRepo, PlaylistRepo, ProcessingRepo, SubtitleRepo, UploadUrlRepo, VideoRepo};
pub use store::VideoStore;

use std::sync::Arc;

/// Store backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Postgres {
        url: String,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    },
    Memory,
}

impl StoreConfig {
    /// Create config from environment variables.
    ///
    /// `DATABASE_URL` selects PostgreSQL; without it the in-memory store
    /// is used.
    pub fn from_env() -> Self {
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => StoreConfig::Postgres {
                url,
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                statement_timeout_ms: std::env::var("DATABASE_STATEMENT_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok()),
            },
            _ => StoreConfig::Memory,
        }
    }
}

/// Create a store from configuration.
pub async fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn VideoStore>> {
    match config {
        StoreConfig::Postgres {
            url,
            max_connections,
            statement_timeout_ms,
        } => {
            tracing::info!("Connecting to PostgreSQL using connection URL");
            let store = PostgresStore::from_url(url, *max_connections, *statement_timeout_ms).await?;
            Ok(Arc::new(store) as Arc<dyn VideoStore>)
        }
        StoreConfig::Memory => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Ok(Arc::new(MemoryStore::new()) as Arc<dyn VideoStore>)
        }
    }
}
