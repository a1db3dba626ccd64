//! Response cache for rendered video views.
//!
//! The cache is never the record of truth: every mutation site
//! invalidates the affected video explicitly, and any cache error is
//! logged and treated as a miss.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use vpipe_models::{VideoId, VideoView};

/// Redis key prefix for cached views.
pub const CACHE_KEY_PREFIX: &str = "vpipe:view";

fn view_key(video_id: &VideoId) -> String {
    format!("{}:{}", CACHE_KEY_PREFIX, video_id)
}

/// Cache of rendered video views.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, video_id: &VideoId) -> Option<VideoView>;

    async fn set(&self, video_id: &VideoId, view: &VideoView);

    async fn invalidate(&self, video_id: &VideoId);
}

/// Redis-backed response cache.
pub struct RedisResponseCache {
    client: redis::Client,
    ttl: Option<Duration>,
}

impl RedisResponseCache {
    pub fn new(client: redis::Client, ttl: Option<Duration>) -> Self {
        Self { client, ttl }
    }

    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!("Cache connection failed: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl ResponseCache for RedisResponseCache {
    async fn get(&self, video_id: &VideoId) -> Option<VideoView> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = match redis::cmd("GET")
            .arg(view_key(video_id))
            .query_async(&mut conn)
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(video_id = %video_id, "Cache GET failed: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&payload?) {
            Ok(view) => Some(view),
            Err(e) => {
                warn!(video_id = %video_id, "Dropping undecodable cached view: {}", e);
                self.invalidate(video_id).await;
                None
            }
        }
    }

    async fn set(&self, video_id: &VideoId, view: &VideoView) {
        let payload = match serde_json::to_string(view) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(video_id = %video_id, "Failed to encode view: {}", e);
                return;
            }
        };
        let Some(mut conn) = self.connection().await else {
            return;
        };

        let mut cmd = redis::cmd("SET");
        cmd.arg(view_key(video_id)).arg(payload);
        if let Some(ttl) = self.ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        if let Err(e) = cmd.query_async::<()>(&mut conn).await {
            warn!(video_id = %video_id, "Cache SET failed: {}", e);
        }
    }

    async fn invalidate(&self, video_id: &VideoId) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        match redis::cmd("DEL")
            .arg(view_key(video_id))
            .query_async::<i32>(&mut conn)
            .await
        {
            Ok(_) => debug!(video_id = %video_id, "Invalidated cached view"),
            Err(e) => warn!(video_id = %video_id, "Cache DEL failed: {}", e),
        }
    }
}

struct CachedView {
    view: VideoView,
    expires_at: Option<Instant>,
}

/// In-process response cache.
#[derive(Default)]
pub struct MemoryResponseCache {
    views: RwLock<HashMap<VideoId, CachedView>>,
    ttl: Option<Duration>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    pub async fn len(&self) -> usize {
        self.views.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.views.read().await.is_empty()
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, video_id: &VideoId) -> Option<VideoView> {
        let views = self.views.read().await;
        let cached = views.get(video_id)?;
        match cached.expires_at {
            Some(at) if at <= Instant::now() => None,
            _ => Some(cached.view.clone()),
        }
    }

    async fn set(&self, video_id: &VideoId, view: &VideoView) {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.views.write().await.insert(
            video_id.clone(),
            CachedView {
                view: view.clone(),
                expires_at,
            },
        );
    }

    async fn invalidate(&self, video_id: &VideoId) {
        self.views.write().await.remove(video_id);
    }
}
