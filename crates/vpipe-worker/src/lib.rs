//! Transcoding pipeline worker.
//!
//! This crate provides:
//! - Upload monitoring and transcoding orchestration
//! - Named locks and the response cache
//! - Subtitle ingestion, video deletion and thumbnails
//! - The queue executor and periodic sweeps

pub mod assets;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod lock;
pub mod logging;
pub mod metrics;
pub mod restart;
pub mod retry;
pub mod runtime;
pub mod scheduler;
pub mod subtitle;
pub mod transcode;
pub mod upload_monitor;
pub mod views;

pub use assets::AssetService;
pub use cache::{MemoryResponseCache, RedisResponseCache, ResponseCache};
pub use config::WorkerConfig;
pub use context::PipelineContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::{process_task, TaskExecutor};
pub use ingest::SubtitleIngestor;
pub use lock::{run_exclusive, LockManager, LockToken, MemoryLockManager, RedisLockManager};
pub use logging::{init_tracing, TaskLogger};
pub use restart::RestartSweeper;
pub use runtime::WorkerRuntime;
pub use transcode::{ProgressAggregator, TranscodeOutcome, TranscodingDriver};
pub use upload_monitor::{UploadCheckOutcome, UploadMonitor};
pub use views::VideoViewService;
