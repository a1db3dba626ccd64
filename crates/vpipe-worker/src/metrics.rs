//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Start the Prometheus exporter on `0.0.0.0:{port}`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("failed to start metrics exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    // Upload metrics
    pub const UPLOAD_CHECKS_TOTAL: &str = "vpipe_upload_checks_total";
    pub const UPLOADS_DETECTED_TOTAL: &str = "vpipe_uploads_detected_total";
    pub const UPLOAD_SWEEP_DISPATCHED: &str = "vpipe_upload_sweep_dispatched";

    // Transcoding metrics
    pub const TRANSCODES_TOTAL: &str = "vpipe_transcodes_total";
    pub const TRANSCODE_DURATION_SECONDS: &str = "vpipe_transcode_duration_seconds";
    pub const RESTARTS_CLAIMED_TOTAL: &str = "vpipe_restarts_claimed_total";

    // Lock metrics
    pub const LOCK_CONTENTION_TOTAL: &str = "vpipe_lock_contention_total";

    // Subtitle metrics
    pub const SUBTITLES_INGESTED_TOTAL: &str = "vpipe_subtitles_ingested_total";

    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "vpipe_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "vpipe_cache_misses_total";

    // Queue metrics
    pub const JOBS_COMPLETED_TOTAL: &str = "vpipe_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vpipe_jobs_failed_total";
    pub const JOBS_DLQ_TOTAL: &str = "vpipe_jobs_dlq_total";
    pub const JOBS_IN_FLIGHT: &str = "vpipe_jobs_in_flight";
}

/// Record one backend upload check.
pub fn record_upload_check(detected: bool) {
    let labels = [("detected", detected.to_string())];
    counter!(names::UPLOAD_CHECKS_TOTAL, &labels).increment(1);
    if detected {
        counter!(names::UPLOADS_DETECTED_TOTAL).increment(1);
    }
}

pub fn record_upload_sweep(dispatched: usize) {
    gauge!(names::UPLOAD_SWEEP_DISPATCHED).set(dispatched as f64);
}

/// Record the outcome of a transcoding run.
pub fn record_transcode(mode: &str, outcome: &str, duration_secs: f64) {
    let labels = [
        ("mode", mode.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::TRANSCODES_TOTAL, &labels).increment(1);
    histogram!(names::TRANSCODE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_restarts_claimed(count: usize) {
    counter!(names::RESTARTS_CLAIMED_TOTAL).increment(count as u64);
}

/// Record a lock acquisition that found the lock already held.
pub fn record_lock_contention(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!(names::LOCK_CONTENTION_TOTAL, &labels).increment(1);
}

pub fn record_subtitle_ingested(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::SUBTITLES_INGESTED_TOTAL, &labels).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    if hit {
        counter!(names::CACHE_HITS_TOTAL).increment(1);
    } else {
        counter!(names::CACHE_MISSES_TOTAL).increment(1);
    }
}

/// Record a finished queue task.
pub fn record_job_finished(kind: &str, success: bool) {
    let labels = [("kind", kind.to_string())];
    if success {
        counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    } else {
        counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
    }
}

pub fn record_job_dlq(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::JOBS_DLQ_TOTAL, &labels).increment(1);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}
