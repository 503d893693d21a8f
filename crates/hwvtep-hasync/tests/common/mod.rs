//! Shared harness for engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sonic_ha_common::{DataChange, KeyedJobQueue, NodeId, Partition, Record};
use sonic_ha_test::{wait_until, MemoryStore, MemoryTopology, RecordingWriter, HA_NODE};
use sonic_hwvtep_hasync::{Collaborators, HaEngine, HaSyncConfig};

pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Engine wired to in-memory collaborators.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub topology: Arc<MemoryTopology>,
    pub writer: Arc<RecordingWriter>,
    pub queue: KeyedJobQueue,
    pub engine: HaEngine,
}

impl Harness {
    /// One aggregate (`HA_NODE`) backed by `children`, all connected.
    pub fn new(children: &[&str]) -> Self {
        Self::with_topology(MemoryTopology::with_group(HA_NODE, children))
    }

    pub fn with_topology(topology: MemoryTopology) -> Self {
        let store = Arc::new(MemoryStore::new());
        let topology = Arc::new(topology);
        let writer = Arc::new(RecordingWriter::backed_by(Arc::clone(&store)));
        let queue = KeyedJobQueue::new();
        let engine = HaEngine::new(
            &HaSyncConfig::default(),
            Collaborators {
                store: store.clone(),
                topology: topology.clone(),
                scheduler: Arc::new(queue.clone()),
                writer: writer.clone(),
            },
        )
        .expect("default config is valid");
        Self {
            store,
            topology,
            writer,
            queue,
            engine,
        }
    }

    /// Stores `record` without notifying the engine.
    pub fn seed(&self, partition: Partition, record: Record) {
        self.store.put(partition, record);
    }

    /// Stores `record` and dispatches the resulting change.
    pub fn write(&self, partition: Partition, record: Record) {
        let before = self.store.get(partition, &record.identity());
        self.store.put(partition, record.clone());
        let change = match before {
            Some(before) => DataChange::update(partition, before, record),
            None => DataChange::add(partition, record),
        };
        self.engine.dispatch(change);
    }

    /// Removes `record` and dispatches the resulting change.
    pub fn remove(&self, partition: Partition, record: &Record) {
        if let Some(before) = self.store.delete(partition, &record.identity()) {
            self.engine.dispatch(DataChange::delete(partition, before));
        }
    }

    /// Waits for every job and every delete completion to finish.
    pub async fn settle(&self) {
        tokio::time::timeout(SETTLE_TIMEOUT, self.queue.wait_idle())
            .await
            .expect("jobs did not finish");
        let engine = &self.engine;
        wait_until(SETTLE_TIMEOUT, || engine.delete_guard().is_empty())
            .await
            .expect("delete markers not cleared");
    }

    pub fn records(&self, partition: Partition, node: &str) -> Vec<Record> {
        self.store.records(partition, &NodeId::new(node))
    }
}
