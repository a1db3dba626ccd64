//! Redis Streams task queue.
//!
//! This crate provides:
//! - Task enqueueing via Redis Streams with idempotency keys
//! - Worker consumption with retry/DLQ
//! - The `TaskDispatcher` seam used by the pipeline to start tasks

pub mod dispatch;
pub mod error;
pub mod job;
pub mod queue;

pub use dispatch::TaskDispatcher;
pub use error::{QueueError, QueueResult};
pub use job::{MonitorUploadJob, QueueJob, TaskId, TranscodeMode, TranscodeVideoJob};
pub use queue::{JobQueue, QueueConfig};
