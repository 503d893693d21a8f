//! Serialized per-key job scheduling.
//!
//! Propagation jobs are keyed by the identity of the record they derive, so
//! that two changes destined for the same target record apply in the order
//! they were submitted while unrelated records proceed in parallel.

use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{error, trace};

/// A unit of propagation work.
pub type Job = BoxFuture<'static, ()>;

/// Single-flight-per-key executor.
///
/// Implementations guarantee that at most one job per key runs at a time and
/// that jobs for the same key run in submission order.
pub trait JobScheduler: Send + Sync {
    fn submit(&self, key: String, job: Job);
}

/// Tokio-backed [`JobScheduler`].
///
/// Each key with outstanding work has a FIFO of pending jobs and exactly one
/// drain task. The drain task retires as soon as its FIFO is empty, so idle
/// keys cost nothing.
///
/// `submit` must be called from within a tokio runtime.
#[derive(Clone, Default)]
pub struct KeyedJobQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    /// Presence of a key means a drain task is running for it.
    queues: Mutex<BTreeMap<String, VecDeque<Job>>>,
    /// Jobs submitted but not yet finished.
    pending: AtomicUsize,
    idle: Notify,
}

impl KeyedJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued and running jobs.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Returns the keys that currently have work in flight.
    pub fn active_keys(&self) -> Vec<String> {
        self.inner.queues.lock().keys().cloned().collect()
    }

    /// Waits until every submitted job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl JobScheduler for KeyedJobQueue {
    fn submit(&self, key: String, job: Job) {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);

        let mut queues = self.inner.queues.lock();
        if let Some(queue) = queues.get_mut(&key) {
            queue.push_back(job);
            trace!(key = %key, depth = queue.len(), "Queued behind in-flight job");
            return;
        }
        queues.insert(key.clone(), VecDeque::new());
        drop(queues);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.drain(key, job).await });
    }
}

impl QueueInner {
    async fn drain(self: Arc<Self>, key: String, first: Job) {
        let mut next = Some(first);
        while let Some(job) = next {
            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                error!(key = %key, "Propagation job panicked");
            }
            self.finish_one();

            let mut queues = self.queues.lock();
            next = match queues.get_mut(&key).and_then(VecDeque::pop_front) {
                Some(job) => Some(job),
                None => {
                    queues.remove(&key);
                    None
                }
            };
        }
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_runs_in_order() {
        let queue = KeyedJobQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5u64 {
            let log = Arc::clone(&log);
            queue.submit(
                "c1/logical_switches/ls0".to_string(),
                Box::pin(async move {
                    // Later jobs sleep less; ordering must still hold.
                    tokio::time::sleep(Duration::from_millis(10 - i * 2)).await;
                    log.lock().push(i);
                }),
            );
        }

        queue.wait_idle().await;
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.pending(), 0);
        assert!(queue.active_keys().is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_run_concurrently() {
        let queue = KeyedJobQueue::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let done = Arc::new(AtomicUsize::new(0));

        // Job on key "a" blocks until the job on key "b" has run.
        let d = Arc::clone(&done);
        queue.submit(
            "a".to_string(),
            Box::pin(async move {
                let _ = rx.await;
                d.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let d = Arc::clone(&done);
        queue.submit(
            "b".to_string(),
            Box::pin(async move {
                d.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            }),
        );

        tokio::time::timeout(Duration::from_secs(1), queue.wait_idle())
            .await
            .unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_wedge_key() {
        let queue = KeyedJobQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        queue.submit("k".to_string(), Box::pin(async { panic!("boom") }));
        let r = Arc::clone(&ran);
        queue.submit(
            "k".to_string(),
            Box::pin(async move {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );

        queue.wait_idle().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(queue.active_keys().is_empty());
    }
}
