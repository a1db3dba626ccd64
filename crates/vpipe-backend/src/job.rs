//! Transcoding job handles.

use serde::{Deserialize, Serialize};

/// Opaque handle of a transcoding job started by the backend.
///
/// The orchestrator never looks inside `payload`; it only hands the
/// handle back to [`VideoBackend::check_progress`](crate::VideoBackend::check_progress).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Progress snapshot of one job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Percentage between 0 and 100
    pub percent: f64,
    /// True once the job finished successfully
    pub done: bool,
}

impl JobProgress {
    pub fn running(percent: f64) -> Self {
        Self {
            percent,
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            percent: 100.0,
            done: true,
        }
    }
}
