//! Structured task logging utilities.
//!
//! Provides consistent, structured logging for pipeline tasks with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vpipe_models::VideoId;

/// Crates logged at `info` unless `RUST_LOG` says otherwise.
const DEFAULT_DIRECTIVES: &[&str] = &[
    "vpipe_worker=info",
    "vpipe_store=info",
    "vpipe_queue=info",
    "vpipe_backend=info",
    "sqlx=warn",
];

/// Initialize tracing: colored output for dev, JSON when `LOG_FORMAT=json`.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()
    }
}

/// Task logger for structured logging with consistent formatting.
///
/// Every line carries the task id, the operation and the video the task
/// works on.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    operation: String,
    video_id: String,
}

impl TaskLogger {
    pub fn new(task_id: impl ToString, operation: &str, video_id: &VideoId) -> Self {
        Self {
            task_id: task_id.to_string(),
            operation: operation.to_string(),
            video_id: video_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            video_id = %self.video_id,
            "Task started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            video_id = %self.video_id,
            "Task progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            operation = %self.operation,
            video_id = %self.video_id,
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            operation = %self.operation,
            video_id = %self.video_id,
            "Task error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            video_id = %self.video_id,
            "Task completed: {}", message
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Create a tracing span for this task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            operation = %self.operation,
            video_id = %self.video_id
        )
    }
}
