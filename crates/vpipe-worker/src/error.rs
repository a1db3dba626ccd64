//! Worker error types.

use thiserror::Error;

use vpipe_backend::BackendError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The named lock is held elsewhere. Expected under contention.
    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    #[error("Lock store error: {0}")]
    Lock(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Store error: {0}")]
    Store(#[from] vpipe_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vpipe_queue::QueueError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Backend(e) => e.is_retryable(),
            WorkerError::Store(vpipe_store::StoreError::Database(_))
            | WorkerError::Queue(_)
            | WorkerError::Redis(_)
            | WorkerError::Lock(_) => true,
            _ => false,
        }
    }

    /// Message recorded on a failed video: the failure itself, without the
    /// error kind prefixes.
    pub fn failure_message(&self) -> String {
        match self {
            WorkerError::JobFailed(msg) => msg.clone(),
            WorkerError::Backend(e) => e.detail(),
            _ => self.to_string(),
        }
    }

    /// Validation failures: the input was rejected and nothing was mutated.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WorkerError::InvalidRequest(_)
                | WorkerError::Backend(BackendError::SubtitleInvalid(_))
                | WorkerError::Backend(BackendError::ThumbnailInvalid(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(WorkerError::Backend(BackendError::provider("timeout")).is_retryable());
        assert!(!WorkerError::LockUnavailable("x".into()).is_retryable());
        assert!(WorkerError::Backend(BackendError::SubtitleInvalid("bad".into())).is_validation());
        assert!(!WorkerError::job_failed("boom").is_validation());
    }

    #[test]
    fn test_failure_message_drops_prefixes() {
        let error = WorkerError::Backend(BackendError::provider("backend down"));
        assert_eq!(error.to_string(), "Backend error: Provider error: backend down");
        assert_eq!(error.failure_message(), "backend down");
        assert_eq!(WorkerError::job_failed("no jobs").failure_message(), "no jobs");
        assert_eq!(WorkerError::not_found("video x").failure_message(), "Not found: video x");
    }
}
