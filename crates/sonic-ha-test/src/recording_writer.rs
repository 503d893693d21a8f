//! Batched writer that records every call

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use sonic_ha_common::{
    BatchedWriter, HaError, HaResult, Partition, Record, RecordIdentity, WriteCompletion,
};
use tokio::sync::oneshot;

use crate::MemoryStore;

/// One call made to the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    Write {
        partition: Partition,
        identity: RecordIdentity,
        record: Record,
    },
    Delete {
        partition: Partition,
        identity: RecordIdentity,
    },
}

impl WriteCall {
    pub fn identity(&self) -> &RecordIdentity {
        match self {
            WriteCall::Write { identity, .. } | WriteCall::Delete { identity, .. } => identity,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, WriteCall::Delete { .. })
    }
}

struct HeldCall {
    call: WriteCall,
    tx: oneshot::Sender<HaResult<()>>,
}

/// [`BatchedWriter`] for tests.
///
/// Every call is recorded. When backed by a [`MemoryStore`], successful
/// operations are committed to it (which in turn notifies subscribers).
/// In hold mode completions stay pending until [`RecordingWriter::release_all`]
/// or [`RecordingWriter::fail_all`] is called.
#[derive(Default)]
pub struct RecordingWriter {
    store: Option<Arc<MemoryStore>>,
    calls: Mutex<Vec<WriteCall>>,
    held: Mutex<Vec<HeldCall>>,
    hold: AtomicBool,
    failing: AtomicBool,
}

impl RecordingWriter {
    /// Creates a writer that only records calls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer that commits to `store`.
    pub fn backed_by(store: Arc<MemoryStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    /// Keeps completions pending until released.
    pub fn set_hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    /// Rejects every subsequent operation.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<WriteCall> {
        self.calls.lock().clone()
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| !c.is_delete())
            .cloned()
            .collect()
    }

    pub fn deletes(&self) -> Vec<WriteCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.is_delete())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Returns the number of completions still held.
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    /// Commits and successfully completes every held operation.
    pub fn release_all(&self) {
        let held_calls = std::mem::take(&mut *self.held.lock());
        for held in held_calls {
            self.commit(&held.call);
            let _ = held.tx.send(Ok(()));
        }
    }

    /// Fails every held operation without committing it.
    pub fn fail_all(&self, message: &str) {
        let held_calls = std::mem::take(&mut *self.held.lock());
        for held in held_calls {
            let _ = held
                .tx
                .send(Err(HaError::write(held.call.identity(), message)));
        }
    }

    fn commit(&self, call: &WriteCall) {
        let Some(store) = &self.store else {
            return;
        };
        match call {
            WriteCall::Write {
                partition,
                identity,
                record,
            } => store.put_at(*partition, identity.clone(), record.clone()),
            WriteCall::Delete {
                partition,
                identity,
            } => {
                store.delete(*partition, identity);
            }
        }
    }

    fn submit(&self, call: WriteCall) -> WriteCompletion {
        self.calls.lock().push(call.clone());

        if self.failing.load(Ordering::SeqCst) {
            let err = HaError::write(call.identity(), "injected write failure");
            return futures::future::ready(Err(err)).boxed();
        }

        if self.hold.load(Ordering::SeqCst) {
            let (tx, rx) = oneshot::channel();
            let identity = call.identity().clone();
            self.held.lock().push(HeldCall { call, tx });
            return async move {
                rx.await
                    .unwrap_or_else(|_| Err(HaError::write(identity, "completion dropped")))
            }
            .boxed();
        }

        self.commit(&call);
        futures::future::ready(Ok(())).boxed()
    }
}

impl BatchedWriter for RecordingWriter {
    fn enqueue_write(
        &self,
        partition: Partition,
        identity: RecordIdentity,
        record: Record,
        _create_parents: bool,
    ) -> WriteCompletion {
        self.submit(WriteCall::Write {
            partition,
            identity,
            record,
        })
    }

    fn enqueue_delete(&self, partition: Partition, identity: RecordIdentity) -> WriteCompletion {
        self.submit(WriteCall::Delete {
            partition,
            identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::logical_switch;

    #[tokio::test]
    async fn test_commit_to_store() {
        let store = Arc::new(MemoryStore::new());
        let writer = RecordingWriter::backed_by(Arc::clone(&store));
        let rec = logical_switch("c1", "ls0", 100);

        writer
            .enqueue_write(Partition::Intended, rec.identity(), rec.clone(), true)
            .await
            .unwrap();
        assert_eq!(store.get(Partition::Intended, &rec.identity()), Some(rec.clone()));

        writer
            .enqueue_delete(Partition::Intended, rec.identity())
            .await
            .unwrap();
        assert!(store.get(Partition::Intended, &rec.identity()).is_none());
        assert_eq!(writer.writes().len(), 1);
        assert_eq!(writer.deletes().len(), 1);
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let writer = RecordingWriter::new();
        writer.set_hold(true);
        let rec = logical_switch("c1", "ls0", 100);

        let completion = writer.enqueue_delete(Partition::Observed, rec.identity());
        assert_eq!(writer.held_count(), 1);

        writer.release_all();
        assert!(completion.await.is_ok());
        assert_eq!(writer.held_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_all() {
        let writer = RecordingWriter::new();
        writer.set_hold(true);
        let rec = logical_switch("c1", "ls0", 100);

        let completion = writer.enqueue_delete(Partition::Observed, rec.identity());
        writer.fail_all("rejected");
        assert!(completion.await.is_err());
    }
}
