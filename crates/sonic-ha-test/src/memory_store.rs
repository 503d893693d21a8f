//! In-memory hierarchical store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use sonic_ha_common::{
    DataChange, HaError, HaResult, HierarchicalStore, Modification, NodeId, Partition, Record,
    RecordIdentity, RecordType,
};
use tokio::sync::{mpsc, Notify};

type Subscriber = (Partition, RecordType, mpsc::UnboundedSender<DataChange>);

/// Two-partition record store that publishes every mutation to matching
/// subscribers, like the datastore change listeners of a controller.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<(Partition, RecordIdentity), Record>>,
    subscribers: Mutex<Vec<Subscriber>>,
    fail_reads: AtomicBool,
    node_read_hold: Mutex<Option<(Partition, NodeId)>>,
    node_read_held: Notify,
    node_read_release: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent read fail with a store error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Holds the next `read_node` of `node` in `partition` once it has taken
    /// its snapshot, until [`MemoryStore::release_node_read`] is called.
    pub fn hold_next_node_read(&self, partition: Partition, node: &NodeId) {
        *self.node_read_hold.lock() = Some((partition, node.clone()));
    }

    /// Waits until a held `read_node` has taken its snapshot.
    pub async fn node_read_held(&self) {
        self.node_read_held.notified().await;
    }

    /// Lets a held `read_node` return its snapshot.
    pub fn release_node_read(&self) {
        self.node_read_release.notify_one();
    }

    /// Puts a record at its own identity and notifies subscribers.
    pub fn put(&self, partition: Partition, record: Record) {
        let identity = record.identity();
        self.put_at(partition, identity, record);
    }

    /// Puts a record at an explicit identity and notifies subscribers.
    pub fn put_at(&self, partition: Partition, identity: RecordIdentity, record: Record) {
        let before = self
            .data
            .lock()
            .insert((partition, identity.clone()), record.clone());
        self.publish(DataChange::new(
            partition,
            identity,
            Modification::write(before, record),
        ));
    }

    /// Removes a record and notifies subscribers if it existed.
    pub fn delete(&self, partition: Partition, identity: &RecordIdentity) -> Option<Record> {
        let removed = self.data.lock().remove(&(partition, identity.clone()));
        if let Some(before) = &removed {
            self.publish(DataChange::new(
                partition,
                identity.clone(),
                Modification::delete(Some(before.clone())),
            ));
        }
        removed
    }

    /// Returns a record without going through the async read path.
    pub fn get(&self, partition: Partition, identity: &RecordIdentity) -> Option<Record> {
        self.data.lock().get(&(partition, identity.clone())).cloned()
    }

    /// Returns every record of `node` in `partition`.
    pub fn records(&self, partition: Partition, node: &NodeId) -> Vec<Record> {
        self.data
            .lock()
            .iter()
            .filter(|((p, id), _)| *p == partition && &id.node == node)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Returns the number of records in `partition`.
    pub fn len(&self, partition: Partition) -> usize {
        self.data
            .lock()
            .keys()
            .filter(|(p, _)| *p == partition)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Returns the number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drops every subscription sender, ending the subscription streams.
    pub fn close_subscriptions(&self) {
        self.subscribers.lock().clear();
    }

    fn publish(&self, change: DataChange) {
        let record_type = change.identity.record_type;
        self.subscribers.lock().retain(|(partition, ty, tx)| {
            if *partition != change.partition || *ty != record_type {
                return true;
            }
            tx.send(change.clone()).is_ok()
        });
    }

    fn check_reads(&self, operation: &str) -> HaResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(HaError::store(operation, "injected read failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl HierarchicalStore for MemoryStore {
    async fn read(
        &self,
        partition: Partition,
        identity: &RecordIdentity,
    ) -> HaResult<Option<Record>> {
        self.check_reads("read")?;
        Ok(self.get(partition, identity))
    }

    async fn read_node(&self, partition: Partition, node: &NodeId) -> HaResult<Vec<Record>> {
        self.check_reads("read_node")?;
        let records = self.records(partition, node);

        let held = {
            let mut hold = self.node_read_hold.lock();
            let matches = hold
                .as_ref()
                .is_some_and(|(p, n)| *p == partition && n == node);
            if matches {
                hold.take();
            }
            matches
        };
        if held {
            self.node_read_held.notify_one();
            self.node_read_release.notified().await;
        }
        Ok(records)
    }

    fn subscribe(
        &self,
        partition: Partition,
        record_type: RecordType,
    ) -> mpsc::UnboundedReceiver<DataChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push((partition, record_type, tx));
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{logical_switch, node};
    use sonic_ha_common::ChangeKind;

    #[tokio::test]
    async fn test_put_publishes_to_matching_subscriber() {
        let store = MemoryStore::new();
        let mut ls_rx = store.subscribe(Partition::Intended, RecordType::LogicalSwitch);
        let mut other_rx = store.subscribe(Partition::Observed, RecordType::LogicalSwitch);

        store.put(Partition::Intended, logical_switch("a", "ls0", 100));

        let change = ls_rx.try_recv().unwrap();
        assert_eq!(change.modification.change_kind().unwrap(), ChangeKind::Add);
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe(Partition::Observed, RecordType::LogicalSwitch);
        let rec = logical_switch("a", "ls0", 100);

        store.put(Partition::Observed, rec.clone());
        store.put(Partition::Observed, logical_switch("a", "ls0", 200));
        assert!(store.delete(Partition::Observed, &rec.identity()).is_some());
        assert!(store.delete(Partition::Observed, &rec.identity()).is_none());

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|c| c.modification.change_kind().unwrap())
            .collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Add, ChangeKind::Update, ChangeKind::Delete]
        );
    }

    #[tokio::test]
    async fn test_read_node_and_failures() {
        let store = MemoryStore::new();
        store.put(Partition::Intended, logical_switch("a", "ls0", 100));
        store.put(Partition::Intended, logical_switch("a", "ls1", 101));
        store.put(Partition::Intended, logical_switch("b", "ls0", 100));

        let recs = store.read_node(Partition::Intended, &node("a")).await.unwrap();
        assert_eq!(recs.len(), 2);

        store.set_fail_reads(true);
        assert!(store.read_node(Partition::Intended, &node("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_held_node_read_returns_old_snapshot() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let rec = logical_switch("a", "ls0", 100);
        store.put(Partition::Intended, rec.clone());
        store.hold_next_node_read(Partition::Intended, &node("a"));

        let reader = std::sync::Arc::clone(&store);
        let read = tokio::spawn(async move {
            reader.read_node(Partition::Intended, &node("a")).await.unwrap()
        });
        store.node_read_held().await;
        store.delete(Partition::Intended, &rec.identity());
        store.release_node_read();

        assert_eq!(read.await.unwrap(), vec![rec]);
        // the hold applies once
        assert!(store
            .read_node(Partition::Intended, &node("a"))
            .await
            .unwrap()
            .is_empty());
    }
}
