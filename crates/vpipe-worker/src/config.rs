//! Worker configuration.

use std::time::Duration;

use vpipe_models::UploadCheckPolicy;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent tasks
    pub max_concurrent_jobs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker should scan for orphaned pending tasks
    pub claim_interval: Duration,

    /// TTL of the per-url upload check lock
    pub upload_lock_ttl: Duration,
    /// Poll interval while waiting for a lock to be released
    pub lock_poll_interval: Duration,
    /// TTL of the transcoding lock. `None` holds the lock until released.
    pub transcode_lock_ttl: Option<Duration>,
    /// Delay between two polling passes over transcoding jobs
    pub transcode_poll_interval: Duration,

    /// Interval of the periodic upload sweep
    pub upload_sweep_interval: Duration,
    /// How long after expiry an upload url is still checked
    pub upload_grace_period: Duration,
    /// Minimum delay between two checks of the same upload url
    pub upload_min_check_interval: Duration,
    /// Maximum upload urls dispatched per sweep
    pub upload_sweep_batch: i64,

    /// Interval of the restart sweep
    pub restart_sweep_interval: Duration,
    /// Maximum restarts claimed per sweep
    pub restart_batch_size: i64,

    /// Maximum subtitle file size in bytes
    pub subtitles_max_bytes: usize,
    /// Maximum thumbnail width and height in pixels
    pub thumbnails_size: u32,
    /// Attempts at deleting backend assets before giving up
    pub backend_delete_retries: u32,

    /// TTL of cached video views. `None` keeps them until invalidated.
    pub cache_ttl: Option<Duration>,
    /// Port of the Prometheus exporter, disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            upload_lock_ttl: Duration::from_secs(60),
            lock_poll_interval: Duration::from_millis(100),
            transcode_lock_ttl: None,
            transcode_poll_interval: Duration::from_secs(5),
            upload_sweep_interval: Duration::from_secs(3600),
            upload_grace_period: Duration::from_secs(3600),
            upload_min_check_interval: Duration::from_secs(10),
            upload_sweep_batch: 1000,
            restart_sweep_interval: Duration::from_secs(5),
            restart_batch_size: 50,
            subtitles_max_bytes: 5 * 1024 * 1024, // 5 MiB
            thumbnails_size: 1024,
            backend_delete_retries: 3,
            cache_ttl: None,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS").unwrap_or(defaults.max_concurrent_jobs),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT")
                .unwrap_or(defaults.shutdown_timeout),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS").unwrap_or(defaults.claim_interval),
            upload_lock_ttl: env_secs("UPLOAD_LOCK_TTL_SECS").unwrap_or(defaults.upload_lock_ttl),
            lock_poll_interval: env_millis("LOCK_POLL_INTERVAL_MS")
                .unwrap_or(defaults.lock_poll_interval),
            // 0 or unset: no TTL
            transcode_lock_ttl: env_secs("TRANSCODE_LOCK_TTL_SECS").filter(|d| !d.is_zero()),
            transcode_poll_interval: env_millis("TRANSCODE_POLL_INTERVAL_MS")
                .unwrap_or(defaults.transcode_poll_interval),
            upload_sweep_interval: env_secs("UPLOAD_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.upload_sweep_interval),
            upload_grace_period: env_secs("UPLOAD_GRACE_PERIOD_SECS")
                .unwrap_or(defaults.upload_grace_period),
            upload_min_check_interval: env_secs("UPLOAD_MIN_CHECK_INTERVAL_SECS")
                .unwrap_or(defaults.upload_min_check_interval),
            upload_sweep_batch: env_parse("UPLOAD_SWEEP_BATCH").unwrap_or(defaults.upload_sweep_batch),
            restart_sweep_interval: env_secs("RESTART_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.restart_sweep_interval),
            restart_batch_size: env_parse("RESTART_BATCH_SIZE").unwrap_or(defaults.restart_batch_size),
            subtitles_max_bytes: env_parse("SUBTITLES_MAX_BYTES")
                .unwrap_or(defaults.subtitles_max_bytes),
            thumbnails_size: env_parse("THUMBNAILS_SIZE").unwrap_or(defaults.thumbnails_size),
            backend_delete_retries: env_parse("BACKEND_DELETE_RETRIES")
                .unwrap_or(defaults.backend_delete_retries),
            cache_ttl: env_secs("CACHE_TTL_SECS").filter(|d| !d.is_zero()),
            metrics_port: env_parse("METRICS_PORT"),
        }
    }

    /// Upload check policy derived from the grace period and check interval.
    pub fn upload_check_policy(&self) -> UploadCheckPolicy {
        UploadCheckPolicy {
            grace_period: chrono::Duration::from_std(self.upload_grace_period)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
            min_check_interval: chrono::Duration::from_std(self.upload_min_check_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(10)),
        }
    }
}
