//! Shared dependencies of the pipeline services.

use std::sync::Arc;

use vpipe_backend::VideoBackend;
use vpipe_queue::TaskDispatcher;
use vpipe_store::VideoStore;

use crate::assets::AssetService;
use crate::cache::ResponseCache;
use crate::config::WorkerConfig;
use crate::ingest::SubtitleIngestor;
use crate::lock::LockManager;
use crate::restart::RestartSweeper;
use crate::transcode::TranscodingDriver;
use crate::upload_monitor::UploadMonitor;
use crate::views::VideoViewService;

/// Everything a pipeline service needs, injected once at process start.
pub struct PipelineContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn VideoStore>,
    pub backend: Arc<dyn VideoBackend>,
    pub locks: Arc<dyn LockManager>,
    pub cache: Arc<dyn ResponseCache>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
}

impl PipelineContext {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn VideoStore>,
        backend: Arc<dyn VideoBackend>,
        locks: Arc<dyn LockManager>,
        cache: Arc<dyn ResponseCache>,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            backend,
            locks,
            cache,
            dispatcher,
        })
    }

    pub fn upload_monitor(self: &Arc<Self>) -> UploadMonitor {
        UploadMonitor::new(self.clone())
    }

    pub fn transcoder(self: &Arc<Self>) -> TranscodingDriver {
        TranscodingDriver::new(self.clone())
    }

    pub fn subtitles(self: &Arc<Self>) -> SubtitleIngestor {
        SubtitleIngestor::new(self.clone())
    }

    pub fn assets(self: &Arc<Self>) -> AssetService {
        AssetService::new(self.clone())
    }

    pub fn views(self: &Arc<Self>) -> VideoViewService {
        VideoViewService::new(self.clone())
    }

    pub fn restarts(self: &Arc<Self>) -> RestartSweeper {
        RestartSweeper::new(self.clone())
    }
}
