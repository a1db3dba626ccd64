//! Worker process wiring.

use std::sync::Arc;

use tracing::{debug, error, info};

use vpipe_backend::VideoBackend;
use vpipe_queue::{JobQueue, QueueConfig, TaskDispatcher};
use vpipe_store::StoreConfig;

use crate::cache::RedisResponseCache;
use crate::config::WorkerConfig;
use crate::context::PipelineContext;
use crate::error::WorkerResult;
use crate::executor::TaskExecutor;
use crate::lock::RedisLockManager;
use crate::logging::init_tracing;
use crate::metrics::init_metrics;
use crate::scheduler::spawn_periodic_tasks;

/// Install the rustls crypto provider used by the Redis and Postgres TLS
/// connections. Installing twice is harmless.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}

/// A worker process: task executor plus periodic sweeps.
pub struct WorkerRuntime {
    ctx: Arc<PipelineContext>,
    executor: TaskExecutor,
}

impl WorkerRuntime {
    pub fn new(ctx: Arc<PipelineContext>, queue: Arc<JobQueue>) -> Self {
        let executor = TaskExecutor::new(Arc::clone(&ctx), queue);
        Self { ctx, executor }
    }

    /// Build a runtime from environment variables around `backend`.
    ///
    /// Loads `.env`, installs the tracing subscriber, connects the store (running migrations) and uses
    /// Redis for the queue, the locks and the response cache.
    pub async fn from_env(backend: Arc<dyn VideoBackend>) -> WorkerResult<Self> {
        install_crypto_provider();
        dotenvy::dotenv().ok();
        if init_tracing().is_err() {
            debug!("Tracing subscriber already installed");
        }

        let config = WorkerConfig::from_env();
        info!("Worker config: {:?}", config);
        if let Some(port) = config.metrics_port {
            init_metrics(port)?;
            info!(port, "Prometheus exporter listening");
        }

        let queue_config = QueueConfig::from_env();
        let redis = redis::Client::open(queue_config.redis_url.as_str())?;

        let store = vpipe_store::from_config(&StoreConfig::from_env()).await?;
        store.migrate().await?;

        let locks = Arc::new(
            RedisLockManager::new(redis.clone()).with_poll_interval(config.lock_poll_interval),
        );
        let cache = Arc::new(RedisResponseCache::new(redis, config.cache_ttl));
        let queue = Arc::new(JobQueue::new(queue_config)?);
        let dispatcher: Arc<dyn TaskDispatcher> = queue.clone();

        let ctx = PipelineContext::new(config, store, backend, locks, cache, dispatcher);
        Ok(Self::new(ctx, queue))
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Run the executor and the periodic sweeps until shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        let periodic = spawn_periodic_tasks(Arc::clone(&self.ctx), self.executor.subscribe_shutdown());
        let result = self.executor.run().await;

        self.executor.shutdown();
        for handle in periodic {
            if let Err(e) = handle.await {
                error!("Periodic task ended abnormally: {}", e);
            }
        }
        result
    }

    /// Run until Ctrl-C.
    pub async fn run_until_signal(&self) -> WorkerResult<()> {
        let run = self.run();
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => return result,
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                self.executor.shutdown();
            }
        }
        let result = run.await;
        info!("Worker shutdown complete");
        result
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}
