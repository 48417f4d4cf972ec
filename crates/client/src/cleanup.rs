//! Fire-and-forget cleanup of upload temp directories.
//!
//! A lost cleanup leaves a stray temp directory on the server. That is
//! acceptable, so failures are logged and dropped: never retried, never
//! reported to the job.

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::backend::JobBackend;

pub struct CleanupAgent {
    backend: Arc<dyn JobBackend>,
    tracker: TaskTracker,
}

impl CleanupAgent {
    pub fn new(backend: Arc<dyn JobBackend>) -> Self {
        Self {
            backend,
            tracker: TaskTracker::new(),
        }
    }

    /// Schedule deletion of `temp_resource_id` and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn cleanup(&self, temp_resource_id: String) {
        let backend = Arc::clone(&self.backend);
        self.tracker.spawn(async move {
            match backend.cleanup(&temp_resource_id).await {
                Ok(()) => {
                    tracing::info!(temp_dir = %temp_resource_id, "Temp resource cleaned up");
                }
                Err(e) => {
                    tracing::warn!(
                        temp_dir = %temp_resource_id,
                        error = %e,
                        "Temp resource cleanup failed, leaving it behind",
                    );
                }
            }
        });
    }

    /// Number of cleanups still in flight.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every scheduled cleanup has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
