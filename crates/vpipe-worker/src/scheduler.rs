//! Periodic triggers: upload sweep and restart sweep.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::context::PipelineContext;
use crate::error::WorkerResult;
use crate::retry::FailureTracker;

/// Consecutive failures logged before a periodic task goes quiet.
const MAX_LOGGED_FAILURES: u32 = 5;

/// Spawn the periodic sweeps. They stop when `shutdown` turns true.
pub fn spawn_periodic_tasks(
    ctx: Arc<PipelineContext>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let upload_ctx = Arc::clone(&ctx);
    let uploads = tokio::spawn(run_periodic(
        "upload_sweep",
        ctx.config.upload_sweep_interval,
        shutdown.clone(),
        move || {
            let ctx = Arc::clone(&upload_ctx);
            async move { ctx.upload_monitor().sweep().await }
        },
    ));

    let restart_ctx = Arc::clone(&ctx);
    let restarts = tokio::spawn(run_periodic(
        "restart_sweep",
        ctx.config.restart_sweep_interval,
        shutdown,
        move || {
            let ctx = Arc::clone(&restart_ctx);
            async move { ctx.restarts().sweep().await }
        },
    ));

    vec![uploads, restarts]
}

/// Run `task` every `period` until shutdown. The first run is immediate.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    task: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = WorkerResult<usize>>,
{
    info!(task = name, ?period, "Starting periodic task");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures = FailureTracker::new(MAX_LOGGED_FAILURES);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                match task().await {
                    Ok(count) => {
                        failures.record_success();
                        debug!(task = name, count, "Periodic task ran");
                    }
                    Err(e) => {
                        if failures.record_failure() {
                            warn!(task = name, "Periodic task failed: {}", e);
                        }
                    }
                }
            }
        }
    }
    info!(task = name, "Periodic task stopped");
}
