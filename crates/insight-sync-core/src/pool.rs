//! Worker pool that drains the work queue and publishes insights.
//!
//! Each worker loops over two events: the next queued record, or the shutdown
//! signal. Queued work is preferred, and an in-flight publish is never
//! cancelled; a worker only exits between records.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Result, SyncError};
use crate::models::PackageRecord;
use crate::queue::{Resolution, WorkQueue};
use crate::registry::SessionRegistry;
use crate::translator;

/// Fixed-size pool of publish workers.
pub struct WorkerPool {
    workers: JoinSet<()>,
    shutdown: CancellationToken,
    worker_count: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("running", &self.workers.len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns `worker_count` workers on the current runtime.
    #[must_use]
    pub fn start(
        worker_count: usize,
        queue: Arc<WorkQueue>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let mut workers = JoinSet::new();

        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let registry = Arc::clone(&registry);
            let shutdown = shutdown.clone();
            workers.spawn(run_worker(worker_id, queue, registry, shutdown));
        }

        info!(worker_count = worker_count, "Worker pool started");
        Self { workers, shutdown, worker_count }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Signals every worker to stop and waits for all of them to exit.
    ///
    /// Callers drain the queue first; a worker that is mid-publish finishes that
    /// record before observing the signal.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();

        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task terminated abnormally");
            }
        }

        info!(worker_count = self.worker_count, "Worker pool stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<WorkQueue>,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
) {
    debug!(worker_id = worker_id, "Worker started");

    loop {
        let next = tokio::select! {
            biased;
            record = queue.next() => record,
            () = shutdown.cancelled() => None,
        };

        let Some(record) = next else {
            break;
        };

        let resolution = match publish(&record, &registry).await {
            Ok(()) => {
                debug!(worker_id = worker_id, package = %record.coordinates(), "Published package insight");
                Resolution::Published
            }
            Err(e) => {
                error!(worker_id = worker_id, error = %e, "Failed to sync package");
                Resolution::Failed
            }
        };
        queue.resolve(resolution);
    }

    debug!(worker_id = worker_id, "Worker stopped");
}

/// Resolves the session for `record`, translates it and publishes it once.
async fn publish(record: &PackageRecord, registry: &SessionRegistry) -> Result<()> {
    let session = registry.lookup(&record.manifest.path).await?;
    let request = translator::translate(session.session_id(), record);

    session.client().publish_insight(request).await.map_err(|e| SyncError::PublishFailed {
        package: record.coordinates(),
        source: Box::new(e),
    })
}
