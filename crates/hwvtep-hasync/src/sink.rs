//! Hand-off of derived operations to the batched writer.

use std::sync::Arc;

use sonic_ha_common::{BatchedWriter, RecordIdentity, WriteCompletion};
use tracing::{debug, warn};

use crate::delete_guard::{DeleteRaceGuard, DeleteToken};
use crate::merge::MergeOp;
use crate::stats::HaStats;

/// Applies [`MergeOp`]s through the writer.
///
/// Completions are never awaited by the caller; each one is watched by a
/// spawned task that logs the outcome and, for deletes, clears the guard
/// marker. Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct PropagationSink {
    writer: Arc<dyn BatchedWriter>,
    guard: Arc<DeleteRaceGuard>,
    stats: Arc<HaStats>,
    create_parents: bool,
}

impl PropagationSink {
    pub fn new(
        writer: Arc<dyn BatchedWriter>,
        guard: Arc<DeleteRaceGuard>,
        stats: Arc<HaStats>,
        create_parents: bool,
    ) -> Self {
        Self {
            writer,
            guard,
            stats,
            create_parents,
        }
    }

    pub fn guard(&self) -> &DeleteRaceGuard {
        &self.guard
    }

    /// Enqueues `op`. Returns false if a delete was collapsed into one
    /// already in flight.
    pub fn apply(&self, op: MergeOp) -> bool {
        match op {
            MergeOp::Write {
                partition,
                identity,
                record,
            } => {
                debug!(%partition, identity = %identity, "Enqueueing write");
                let completion =
                    self.writer
                        .enqueue_write(partition, identity.clone(), record, self.create_parents);
                self.stats.record_write();
                self.watch(identity, completion, None);
                true
            }
            MergeOp::Delete {
                partition,
                identity,
            } => {
                let Some(token) = self.guard.try_begin_delete(&identity) else {
                    debug!(%partition, identity = %identity, "Delete already in flight, collapsing");
                    self.stats.record_collapsed_delete();
                    return false;
                };
                debug!(%partition, identity = %identity, "Enqueueing delete");
                let completion = self.writer.enqueue_delete(partition, identity.clone());
                self.stats.record_delete();
                self.watch(identity, completion, Some(token));
                true
            }
        }
    }

    fn watch(
        &self,
        identity: RecordIdentity,
        completion: WriteCompletion,
        marker: Option<DeleteToken>,
    ) {
        let guard = Arc::clone(&self.guard);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            if let Err(e) = completion.await {
                warn!(identity = %identity, error = %e, "Propagated operation failed");
                stats.record_write_failure();
            }
            if let Some(token) = marker {
                guard.complete(&identity, token);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_ha_common::Partition;
    use sonic_ha_test::{logical_switch, wait_until, RecordingWriter, HA_NODE};
    use std::time::Duration;

    fn sink(writer: Arc<RecordingWriter>) -> (PropagationSink, Arc<HaStats>) {
        let stats = Arc::new(HaStats::new());
        let sink = PropagationSink::new(
            writer,
            Arc::new(DeleteRaceGuard::default()),
            Arc::clone(&stats),
            true,
        );
        (sink, stats)
    }

    fn delete_op() -> MergeOp {
        MergeOp::Delete {
            partition: Partition::Observed,
            identity: logical_switch(HA_NODE, "ls0", 1).identity(),
        }
    }

    #[tokio::test]
    async fn test_delete_collapsed_until_completion() {
        let writer = Arc::new(RecordingWriter::new());
        writer.set_hold(true);
        let (sink, stats) = sink(Arc::clone(&writer));

        assert!(sink.apply(delete_op()));
        assert!(!sink.apply(delete_op()));
        assert_eq!(writer.deletes().len(), 1);
        assert_eq!(stats.snapshot().deletes_collapsed, 1);

        writer.release_all();
        let guard = sink.guard.clone();
        wait_until(Duration::from_secs(1), || guard.is_empty())
            .await
            .unwrap();
        assert!(sink.apply(delete_op()));
        assert_eq!(writer.deletes().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_delete_clears_marker() {
        let writer = Arc::new(RecordingWriter::new());
        writer.set_failing(true);
        let (sink, stats) = sink(Arc::clone(&writer));

        assert!(sink.apply(delete_op()));
        wait_until(Duration::from_secs(1), || stats.snapshot().write_failures == 1)
            .await
            .unwrap();
        assert!(sink.guard().is_empty());
    }

    #[tokio::test]
    async fn test_stale_completion_leaves_newer_marker() {
        let writer = Arc::new(RecordingWriter::new());
        writer.set_hold(true);
        let stats = Arc::new(HaStats::new());
        let guard = Arc::new(DeleteRaceGuard::new(Duration::from_secs(60), 1));
        let sink = PropagationSink::new(writer.clone(), Arc::clone(&guard), Arc::clone(&stats), true);
        let row = logical_switch(HA_NODE, "ls0", 1).identity();
        let other = logical_switch(HA_NODE, "ls1", 1).identity();

        assert!(sink.apply(delete_op()));
        // the in-flight marker is evicted and a newer delete takes its place
        assert!(guard.try_begin_delete(&other).is_some());
        let newer = guard.try_begin_delete(&row).unwrap();

        writer.fail_all("device rejected");
        wait_until(Duration::from_secs(1), || stats.snapshot().write_failures == 1)
            .await
            .unwrap();
        assert!(guard.is_pending(&row));
        assert!(!sink.apply(delete_op()));

        guard.complete(&row, newer);
        assert!(guard.is_empty());
    }

    #[tokio::test]
    async fn test_write_enqueued() {
        let writer = Arc::new(RecordingWriter::new());
        let (sink, stats) = sink(Arc::clone(&writer));
        let rec = logical_switch(HA_NODE, "ls0", 1);

        assert!(sink.apply(MergeOp::Write {
            partition: Partition::Intended,
            identity: rec.identity(),
            record: rec,
        }));
        assert_eq!(writer.writes().len(), 1);
        assert_eq!(stats.snapshot().writes_enqueued, 1);
    }
}
