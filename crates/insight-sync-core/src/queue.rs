//! Bounded work queue with an in-flight counter.
//!
//! Every record accepted by [`WorkQueue::submit`] is counted as pending until a
//! worker resolves it through [`WorkQueue::resolve`]. The pending count is the
//! shutdown barrier: [`WorkQueue::wait_drained`] returns once it reaches zero.
//! Acceptance and closing share one lock, so no record can slip in after the
//! queue has been closed and observed drained.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error};

use crate::error::{Result, SyncError};
use crate::models::PackageRecord;

/// How a dispatched record was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Published,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PendingState {
    pending: usize,
    closed: bool,
}

/// Queue metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetrics {
    /// Records accepted but not yet resolved.
    pub pending: usize,
    /// Records accepted in total.
    pub submitted: u64,
    /// Records published successfully.
    pub published: u64,
    /// Records dropped after a failure.
    pub failed: u64,
}

impl QueueMetrics {
    /// Total resolutions, successful or not.
    pub fn resolved(&self) -> u64 {
        self.published + self.failed
    }
}

/// Bounded multi-consumer queue of package records.
pub struct WorkQueue {
    sender: mpsc::Sender<PackageRecord>,
    receiver: Arc<Mutex<mpsc::Receiver<PackageRecord>>>,
    state: watch::Sender<PendingState>,
    capacity: usize,
    submitted: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
}

impl WorkQueue {
    /// Creates a queue holding at most `capacity` undispatched records.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        let (state, _) = watch::channel(PendingState::default());
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            state,
            capacity,
            submitted: AtomicU64::new(0),
            published: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Counts `record` as pending and enqueues it, waiting while the queue is full.
    ///
    /// # Errors
    /// Returns `SyncError::Closed` if the queue no longer accepts work.
    pub async fn submit(&self, record: PackageRecord) -> Result<()> {
        let accepted = self.state.send_if_modified(|state| {
            if state.closed {
                return false;
            }
            state.pending += 1;
            true
        });
        if !accepted {
            return Err(SyncError::Closed);
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);

        if self.sender.send(record).await.is_err() {
            error!("Work queue receiver dropped, discarding record");
            self.resolve(Resolution::Failed);
            return Err(SyncError::Closed);
        }
        Ok(())
    }

    /// Waits for the next record. Cancel-safe: dropping the future loses nothing.
    pub async fn next(&self) -> Option<PackageRecord> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Marks one dispatched record as resolved.
    pub fn resolve(&self, resolution: Resolution) {
        match resolution {
            Resolution::Published => self.published.fetch_add(1, Ordering::Relaxed),
            Resolution::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
        };

        self.state.send_modify(|state| {
            debug_assert!(state.pending > 0, "resolved more records than were submitted");
            state.pending = state.pending.saturating_sub(1);
        });
    }

    /// Stops accepting new records. Records already accepted are still delivered.
    pub fn close(&self) {
        self.state.send_if_modified(|state| {
            let changed = !state.closed;
            state.closed = true;
            changed
        });
        debug!(pending = self.pending(), "Work queue closed");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Waits until every accepted record has been resolved.
    pub async fn wait_drained(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|state| state.pending == 0).await;
    }

    /// Records accepted but not yet resolved.
    pub fn pending(&self) -> usize {
        self.state.borrow().pending
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns queue metrics.
    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            pending: self.pending(),
            submitted: self.submitted.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("capacity", &self.capacity)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ecosystem, ManifestRef};
    use std::time::Duration;

    fn record(name: &str) -> PackageRecord {
        let manifest = Arc::new(ManifestRef {
            ecosystem: Ecosystem::Npm,
            path: "package.json".to_string(),
            display_path: None,
        });
        PackageRecord::new(manifest, name, "1.0.0")
    }

    #[tokio::test]
    async fn test_submit_and_next() {
        let queue = WorkQueue::new(4);
        queue.submit(record("a")).await.unwrap();
        assert_eq!(queue.pending(), 1);

        let next = queue.next().await.unwrap();
        assert_eq!(next.name, "a");
        // Dequeue alone does not resolve the record.
        assert_eq!(queue.pending(), 1);

        queue.resolve(Resolution::Published);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_metrics() {
        let queue = WorkQueue::new(4);
        queue.submit(record("a")).await.unwrap();
        queue.submit(record("b")).await.unwrap();
        queue.next().await.unwrap();
        queue.resolve(Resolution::Published);
        queue.next().await.unwrap();
        queue.resolve(Resolution::Failed);

        let metrics = queue.metrics();
        assert_eq!(metrics.pending, 0);
        assert_eq!(metrics.submitted, 2);
        assert_eq!(metrics.published, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.resolved(), metrics.submitted);
    }

    #[tokio::test]
    async fn test_submit_after_close_is_rejected() {
        let queue = WorkQueue::new(4);
        queue.close();
        assert!(queue.is_closed());

        let result = queue.submit(record("late")).await;
        assert!(matches!(result, Err(SyncError::Closed)));
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.metrics().submitted, 0);
    }

    #[tokio::test]
    async fn test_wait_drained_returns_immediately_when_idle() {
        let queue = WorkQueue::new(1);
        tokio::time::timeout(Duration::from_secs(1), queue.wait_drained()).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_drained_blocks_until_resolved() {
        let queue = Arc::new(WorkQueue::new(2));
        queue.submit(record("a")).await.unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_drained().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.next().await.unwrap();
        queue.resolve(Resolution::Failed);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_submit_blocks_when_full() {
        let queue = Arc::new(WorkQueue::new(1));
        queue.submit(record("a")).await.unwrap();

        let blocked = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.submit(record("b")).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());
        // Counted as pending while waiting for capacity.
        assert_eq!(queue.pending(), 2);

        queue.next().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), blocked).await.unwrap().unwrap().unwrap();
        assert_eq!(queue.next().await.unwrap().name, "b");
    }
}
