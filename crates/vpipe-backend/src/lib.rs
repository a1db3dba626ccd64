//! Provider interface for the video pipeline.
//!
//! The orchestrator reaches the concrete transcoding and storage service
//! only through the [`VideoBackend`] trait.

pub mod backend;
pub mod error;
pub mod job;

pub use backend::VideoBackend;
pub use error::{BackendError, BackendResult};
pub use job::{JobHandle, JobProgress};
