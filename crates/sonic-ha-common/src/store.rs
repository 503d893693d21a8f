//! Hierarchical store and batched writer collaborator traits.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::{DataChange, HaResult, NodeId, Partition, Record, RecordIdentity, RecordType};

/// Completion of a batched write or delete.
///
/// Resolves once the writer has committed (or rejected) the operation. The
/// engine never awaits a completion inline; it hands it to a spawned task.
pub type WriteCompletion = BoxFuture<'static, HaResult<()>>;

/// Snapshot-isolated read access to the two partitions plus change
/// subscriptions.
#[async_trait]
pub trait HierarchicalStore: Send + Sync {
    /// Reads a single record.
    async fn read(&self, partition: Partition, identity: &RecordIdentity)
        -> HaResult<Option<Record>>;

    /// Reads every record owned by `node` in `partition`.
    async fn read_node(&self, partition: Partition, node: &NodeId) -> HaResult<Vec<Record>>;

    /// Subscribes to changes of one table across all nodes of a partition.
    ///
    /// The stream ends when the store drops its sender.
    fn subscribe(
        &self,
        partition: Partition,
        record_type: RecordType,
    ) -> mpsc::UnboundedReceiver<DataChange>;
}

/// Asynchronous, batched mutation of the store.
pub trait BatchedWriter: Send + Sync {
    /// Queues a put of `record` at `identity`.
    fn enqueue_write(
        &self,
        partition: Partition,
        identity: RecordIdentity,
        record: Record,
        create_parents: bool,
    ) -> WriteCompletion;

    /// Queues a delete of the record at `identity`.
    fn enqueue_delete(&self, partition: Partition, identity: RecordIdentity) -> WriteCompletion;
}
