//! Fire-and-forget task dispatch.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::queue::JobQueue;

/// Enqueues tasks without waiting for them to run.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Returns false when an identical task is already queued.
    async fn dispatch(&self, job: QueueJob) -> QueueResult<bool>;
}

#[async_trait]
impl TaskDispatcher for JobQueue {
    async fn dispatch(&self, job: QueueJob) -> QueueResult<bool> {
        match self.enqueue(job).await {
            Ok(_) => Ok(true),
            Err(QueueError::Duplicate(key)) => {
                debug!("Task already queued: {}", key);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
