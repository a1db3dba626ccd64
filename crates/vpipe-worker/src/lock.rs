//! Named mutual-exclusion locks shared by all workers.
//!
//! A lock is identified by its name (`vpipe:lock:{operation}:{video_id}`).
//! Acquisition is an atomic set-if-absent; release only deletes the lock
//! if it still carries the token returned at acquisition, so an expired
//! and re-acquired lock is never released by its previous holder.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use redis::Script;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use vpipe_models::VideoId;

use crate::error::{WorkerError, WorkerResult};

/// Prefix of every lock name.
pub const LOCK_PREFIX: &str = "vpipe:lock";

/// Default delay between two polls while waiting for a lock.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Lock name guarding the upload check of one upload url.
pub fn monitor_upload_lock(video_id: &VideoId) -> String {
    format!("{}:monitor_upload:{}", LOCK_PREFIX, video_id)
}

/// Lock name guarding the transcoding of one video.
pub fn transcode_lock(video_id: &VideoId) -> String {
    format!("{}:transcode:{}", LOCK_PREFIX, video_id)
}

/// Proof of ownership of an acquired lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    name: String,
    value: String,
}

impl LockToken {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: format!("worker:{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Named lock store.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquire `name` if nobody holds it.
    ///
    /// Fails with `WorkerError::LockUnavailable` when the lock is held.
    /// Without `ttl` the lock is held until released.
    async fn try_acquire(&self, name: &str, ttl: Option<Duration>) -> WorkerResult<LockToken>;

    /// Release a lock. Never fails: storage errors are logged.
    async fn release(&self, token: &LockToken);

    /// Check whether `name` is currently held by anyone.
    async fn is_held(&self, name: &str) -> WorkerResult<bool>;

    /// Delete `name` whoever holds it. Returns false if it was not held.
    async fn force_release(&self, name: &str) -> WorkerResult<bool>;

    /// Delay between two polls in [`wait_until_released`](Self::wait_until_released).
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Block until `name` is no longer held. Does not acquire it.
    async fn wait_until_released(&self, name: &str) -> WorkerResult<()> {
        while self.is_held(name).await? {
            tokio::time::sleep(self.poll_interval()).await;
        }
        Ok(())
    }
}

/// Run `fut` while holding `name`, releasing the lock on every exit path.
///
/// Fails with `WorkerError::LockUnavailable` without polling `fut` if the
/// lock is held elsewhere. A panic inside `fut` releases the lock before
/// resuming.
///
/// ```
/// # use vpipe_worker::{run_exclusive, LockManager, MemoryLockManager, WorkerResult};
/// # tokio_test::block_on(async {
/// let locks = MemoryLockManager::new();
/// let answer = run_exclusive(&locks, "vpipe:lock:demo", None, async { WorkerResult::Ok(42) })
///     .await
///     .unwrap();
/// assert_eq!(answer, 42);
/// assert!(!locks.is_held("vpipe:lock:demo").await.unwrap());
/// # });
/// ```
pub async fn run_exclusive<L, F, T>(
    locks: &L,
    name: &str,
    ttl: Option<Duration>,
    fut: F,
) -> WorkerResult<T>
where
    L: LockManager + ?Sized,
    F: Future<Output = WorkerResult<T>> + Send,
{
    let token = locks.try_acquire(name, ttl).await?;
    let result = AssertUnwindSafe(fut).catch_unwind().await;
    locks.release(&token).await;
    match result {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Redis-backed lock manager.
pub struct RedisLockManager {
    client: redis::Client,
    poll_interval: Duration,
}

impl RedisLockManager {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn from_url(redis_url: &str) -> WorkerResult<Self> {
        Ok(Self::new(redis::Client::open(redis_url)?))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn connection(&self) -> WorkerResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| WorkerError::Lock(format!("Redis connection failed: {}", e)))
    }
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn try_acquire(&self, name: &str, ttl: Option<Duration>) -> WorkerResult<LockToken> {
        let mut conn = self.connection().await?;
        let token = LockToken::new(name);

        // SET key value NX [PX ttl]
        let mut cmd = redis::cmd("SET");
        cmd.arg(name).arg(token.value()).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let result: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| WorkerError::Lock(format!("Redis SET failed: {}", e)))?;

        if result.is_some() {
            debug!(lock = name, "Acquired lock");
            Ok(token)
        } else {
            Err(WorkerError::LockUnavailable(name.to_string()))
        }
    }

    async fn release(&self, token: &LockToken) {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(lock = token.name(), "Failed to release lock: {}", e);
                return;
            }
        };

        let deleted: Result<i32, redis::RedisError> = Script::new(RELEASE_SCRIPT)
            .key(token.name())
            .arg(token.value())
            .invoke_async(&mut conn)
            .await;

        match deleted {
            Ok(1) => debug!(lock = token.name(), "Released lock"),
            Ok(_) => warn!(lock = token.name(), "Lock expired or was taken over before release"),
            Err(e) => error!(lock = token.name(), "Redis unlock failed: {}", e),
        }
    }

    async fn is_held(&self, name: &str) -> WorkerResult<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = redis::cmd("EXISTS")
            .arg(name)
            .query_async(&mut conn)
            .await
            .map_err(|e| WorkerError::Lock(format!("Redis EXISTS failed: {}", e)))?;
        Ok(exists)
    }

    async fn force_release(&self, name: &str) -> WorkerResult<bool> {
        let mut conn = self.connection().await?;
        let deleted: i32 = redis::cmd("DEL")
            .arg(name)
            .query_async(&mut conn)
            .await
            .map_err(|e| WorkerError::Lock(format!("Redis DEL failed: {}", e)))?;
        if deleted > 0 {
            warn!(lock = name, "Lock force-released");
        }
        Ok(deleted > 0)
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[derive(Debug)]
struct HeldLock {
    value: String,
    expires_at: Option<Instant>,
}

impl HeldLock {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Single-process lock manager.
#[derive(Debug)]
pub struct MemoryLockManager {
    locks: Mutex<HashMap<String, HeldLock>>,
    poll_interval: Duration,
}

impl Default for MemoryLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn try_acquire(&self, name: &str, ttl: Option<Duration>) -> WorkerResult<LockToken> {
        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        if locks.get(name).is_some_and(|held| held.is_live(now)) {
            return Err(WorkerError::LockUnavailable(name.to_string()));
        }
        let token = LockToken::new(name);
        locks.insert(
            name.to_string(),
            HeldLock {
                value: token.value().to_string(),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(token)
    }

    async fn release(&self, token: &LockToken) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(token.name())
            .is_some_and(|held| held.value == token.value())
        {
            locks.remove(token.name());
        } else {
            warn!(lock = token.name(), "Lock expired or was taken over before release");
        }
    }

    async fn is_held(&self, name: &str) -> WorkerResult<bool> {
        let now = Instant::now();
        let locks = self.locks.lock().await;
        Ok(locks.get(name).is_some_and(|held| held.is_live(now)))
    }

    async fn force_release(&self, name: &str) -> WorkerResult<bool> {
        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        Ok(locks.remove(name).is_some_and(|held| held.is_live(now)))
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
