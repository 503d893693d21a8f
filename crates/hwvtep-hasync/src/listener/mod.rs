//! Per-table, per-partition change listeners.
//!
//! A listener only decides *where* a change goes. It resolves the HA
//! grouping of the changed node and submits one propagation job per target,
//! keyed by the identity the record will have on that target, so that
//! changes to the same target row are applied in order while unrelated rows
//! proceed in parallel. All store I/O happens inside the job.

mod job;

use std::sync::Arc;

use sonic_ha_common::{ChangeKind, DataChange, NodeId, Partition, Record, RecordType};
use tracing::{debug, trace, warn};

use crate::engine::EngineContext;
use crate::merge::MergeDirection;

use job::PropagationJob;

/// Change listener for one (table, partition) pair.
///
/// Intended-partition listeners fan an aggregate's config out to its
/// children; observed-partition listeners fan a child's state in to its
/// aggregate.
pub struct NodeDataListener {
    record_type: RecordType,
    partition: Partition,
    ctx: Arc<EngineContext>,
}

impl NodeDataListener {
    pub(crate) fn new(record_type: RecordType, partition: Partition, ctx: Arc<EngineContext>) -> Self {
        Self {
            record_type,
            partition,
            ctx,
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn direction(&self) -> MergeDirection {
        MergeDirection::for_partition(self.partition)
    }

    /// Handles one notification. Never blocks on I/O.
    pub fn on_change(&self, change: DataChange) {
        self.ctx.stats.record_notification();

        if change.partition != self.partition || change.identity.record_type != self.record_type {
            warn!(
                listener_table = %self.record_type,
                listener_partition = %self.partition,
                identity = %change.identity,
                "Notification routed to the wrong listener, dropping"
            );
            return;
        }

        let kind = match change.modification.change_kind() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(identity = %change.identity, error = %e, "Skipping unclassifiable change");
                self.ctx.stats.record_error();
                return;
            }
        };

        let direction = self.direction();
        if !self.ctx.aggregator.is_eligible(direction, self.record_type) {
            trace!(%direction, table = %self.record_type, "Table not replicated in this direction");
            return;
        }

        if kind == ChangeKind::Update && change.modification.is_noop() {
            trace!(identity = %change.identity, "Unchanged update, skipping");
            self.ctx.stats.record_noop();
            return;
        }

        let Some(record) = change.modification.record().cloned() else {
            trace!(identity = %change.identity, "Delete without before image, skipping");
            self.ctx.stats.record_noop();
            return;
        };

        let source = change.identity.node.clone();
        let targets = match self.resolve_targets(&source) {
            Ok(targets) => targets,
            Err(e) => {
                warn!(node = %source, error = %e, "HA topology lookup failed, dropping change");
                self.ctx.stats.record_error();
                return;
            }
        };

        if targets.is_empty() {
            trace!(node = %source, %direction, "Node is not part of an HA group");
            self.ctx.stats.record_unmapped();
            return;
        }

        debug!(
            identity = %change.identity,
            ?kind,
            %direction,
            targets = targets.len(),
            "Scheduling propagation"
        );
        for target in targets {
            self.submit(direction, &source, target, &record, &change);
        }
    }

    fn resolve_targets(&self, node: &NodeId) -> sonic_ha_common::HaResult<Vec<NodeId>> {
        match self.partition {
            Partition::Intended => Ok(self.ctx.topology.children(node)?.into_iter().collect()),
            Partition::Observed => Ok(self.ctx.topology.parent(node)?.into_iter().collect()),
        }
    }

    fn submit(
        &self,
        direction: MergeDirection,
        source: &NodeId,
        target: NodeId,
        record: &Record,
        change: &DataChange,
    ) {
        let target_identity = self.ctx.aggregator.target_identity(&target, record);
        let key = target_identity.to_string();
        let job = PropagationJob {
            ctx: Arc::clone(&self.ctx),
            direction,
            source: source.clone(),
            target,
            target_identity,
            modification: change.modification.clone(),
        };
        self.ctx.scheduler.submit(key, Box::pin(job.run()));
        self.ctx.stats.record_job();
    }
}

impl std::fmt::Debug for NodeDataListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDataListener")
            .field("record_type", &self.record_type)
            .field("partition", &self.partition)
            .finish()
    }
}
