//! Task executor.
//!
//! Consumes pipeline tasks from the Redis stream and runs them with a
//! bounded number of concurrent tasks. Failed tasks are left pending for
//! redelivery while they are retryable, then moved to the DLQ.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use vpipe_queue::{JobQueue, QueueJob};

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;
use crate::metrics;

/// Maximum tasks read from the stream at once.
const CONSUME_BATCH: usize = 5;
/// How long a stream read blocks waiting for tasks.
const CONSUME_BLOCK_MS: u64 = 1000;

/// Task executor that processes tasks from the queue.
pub struct TaskExecutor {
    ctx: Arc<PipelineContext>,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl TaskExecutor {
    pub fn new(ctx: Arc<PipelineContext>, queue: Arc<JobQueue>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            ctx,
            queue,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Receiver notified when shutdown is signalled.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting task executor '{}' with {} max concurrent tasks",
            self.consumer_name, self.ctx.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_loop();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_tasks() => {
                    if let Err(e) = result {
                        error!("Error consuming tasks: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight tasks to complete...");
        if tokio::time::timeout(self.ctx.config.shutdown_timeout, self.wait_for_tasks())
            .await
            .is_err()
        {
            warn!("Shutdown timeout reached with tasks still running");
        }

        info!("Task executor stopped");
        Ok(())
    }

    /// Periodically claim tasks left pending by crashed workers.
    fn spawn_claim_loop(&self) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let queue = Arc::clone(&self.queue);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ctx.config.claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue.claim_pending(&consumer_name, CONSUME_BATCH).await {
                            Ok(tasks) if !tasks.is_empty() => {
                                info!("Claimed {} pending tasks", tasks.len());
                                for (message_id, job) in tasks {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    let queue = Arc::clone(&queue);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        execute_task(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim pending tasks: {}", e),
                        }
                    }
                }
            }
        })
    }

    async fn consume_tasks(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let tasks = self
            .queue
            .consume(
                &self.consumer_name,
                CONSUME_BLOCK_MS,
                available.min(CONSUME_BATCH),
            )
            .await?;

        if tasks.is_empty() {
            return Ok(());
        }
        debug!("Consumed {} tasks from queue", tasks.len());

        for (message_id, job) in tasks {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                execute_task(ctx, queue, message_id, job).await;
            });
        }
        metrics::set_jobs_in_flight(
            self.ctx.config.max_concurrent_jobs - self.job_semaphore.available_permits(),
        );

        Ok(())
    }

    async fn wait_for_tasks(&self) {
        while self.job_semaphore.available_permits() < self.ctx.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Execute one queued task, then ack it or schedule its retry.
async fn execute_task(ctx: Arc<PipelineContext>, queue: Arc<JobQueue>, message_id: String, job: QueueJob) {
    let logger = TaskLogger::new(job.job_id(), job.kind(), job.video_id());
    let span = logger.create_span();

    async {
        logger.log_start("executing");
        let result = process_task(&ctx, &job).await;

        match result {
            Ok(()) => {
                logger.log_completion("success");
                metrics::record_job_finished(job.kind(), true);
                if let Err(e) = queue.ack(&message_id).await {
                    logger.log_error(&format!("failed to ack: {}", e));
                }
                // The same task may be dispatched again later
                if let Err(e) = queue.clear_dedup(&job).await {
                    logger.log_warning(&format!("failed to clear dedup key: {}", e));
                }
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                metrics::record_job_finished(job.kind(), false);

                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(u32::MAX);
                let max_retries = queue.max_retries();

                if !e.is_retryable() || retry_count >= max_retries {
                    logger.log_warning(&format!(
                        "giving up after {} attempt(s), moving to DLQ",
                        retry_count.min(max_retries)
                    ));
                    metrics::record_job_dlq(job.kind());
                    if let Err(dlq_err) = queue.dlq(&message_id, &job, &e.to_string()).await {
                        logger.log_error(&format!("failed to move to DLQ: {}", dlq_err));
                    }
                    if let Err(e) = queue.clear_dedup(&job).await {
                        logger.log_warning(&format!("failed to clear dedup key: {}", e));
                    }
                } else {
                    logger.log_progress(&format!(
                        "will be retried (attempt {}/{})",
                        retry_count, max_retries
                    ));
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Run a pipeline task to completion.
pub async fn process_task(ctx: &Arc<PipelineContext>, job: &QueueJob) -> WorkerResult<()> {
    match job {
        QueueJob::MonitorUpload(j) => {
            let outcome = ctx.upload_monitor().check(&j.video_id, j.wait).await?;
            debug!(video_id = %j.video_id, ?outcome, "Upload check done");
            Ok(())
        }
        QueueJob::TranscodeVideo(j) => {
            let outcome = ctx.transcoder().run(&j.video_id, j.mode).await?;
            debug!(video_id = %j.video_id, ?outcome, "Transcoding done");
            Ok(())
        }
    }
}
