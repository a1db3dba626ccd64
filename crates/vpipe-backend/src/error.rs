//! Backend error types.

use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Nothing was uploaded on the url yet. Not an error for the caller.
    #[error("Video not uploaded: {0}")]
    NotUploaded(String),

    /// A single transcoding job failed.
    #[error("{0}")]
    TranscodingFailed(String),

    #[error("Invalid subtitle: {0}")]
    SubtitleInvalid(String),

    #[error("Invalid thumbnail: {0}")]
    ThumbnailInvalid(String),

    #[error("Operation not supported by backend: {0}")]
    Unsupported(&'static str),

    /// Provider-side failure (network, API, storage).
    #[error("Provider error: {0}")]
    Provider(String),
}

impl BackendError {
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn transcoding_failed(msg: impl Into<String>) -> Self {
        Self::TranscodingFailed(msg.into())
    }

    /// The failure detail without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            BackendError::NotUploaded(msg)
            | BackendError::TranscodingFailed(msg)
            | BackendError::SubtitleInvalid(msg)
            | BackendError::ThumbnailInvalid(msg)
            | BackendError::Provider(msg) => msg.clone(),
            BackendError::Unsupported(_) => self.to_string(),
        }
    }

    /// Check if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Provider(_))
    }
}
