//! Propagation of one change to one target node.

use std::sync::Arc;

use sonic_ha_common::{Modification, ModificationKind, NodeId, RecordIdentity};
use tracing::{debug, trace, warn};

use crate::engine::EngineContext;
use crate::merge::MergeDirection;

pub(crate) struct PropagationJob {
    pub(crate) ctx: Arc<EngineContext>,
    pub(crate) direction: MergeDirection,
    pub(crate) source: NodeId,
    pub(crate) target: NodeId,
    pub(crate) target_identity: RecordIdentity,
    pub(crate) modification: Modification,
}

impl PropagationJob {
    pub(crate) async fn run(self) {
        let ctx = &self.ctx;

        // A child that dropped its session reports all its rows as deleted;
        // that must not retract what the aggregate still gets from others.
        if self.direction == MergeDirection::FanIn && self.is_delete() {
            match ctx.topology.is_connected(&self.source) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        child = %self.source,
                        identity = %self.target_identity,
                        "Child disconnected, suppressing observed delete"
                    );
                    ctx.stats.record_suppressed_delete();
                    return;
                }
                Err(e) => {
                    warn!(child = %self.source, error = %e, "Connectivity check failed, dropping job");
                    ctx.stats.record_error();
                    return;
                }
            }
        }

        let partition = self.direction.partition();
        let existing = match ctx.store.read(partition, &self.target_identity).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(identity = %self.target_identity, error = %e, "Target read failed, dropping job");
                ctx.stats.record_error();
                return;
            }
        };

        match ctx.aggregator.incremental_merge(
            self.direction,
            &self.target,
            &self.modification,
            existing.as_ref(),
        ) {
            Ok(Some(op)) => {
                ctx.sink.apply(op);
            }
            Ok(None) => {
                trace!(identity = %self.target_identity, "Nothing to propagate");
                ctx.stats.record_noop();
            }
            Err(e) => {
                warn!(identity = %self.target_identity, error = %e, "Skipping modification");
                ctx.stats.record_error();
            }
        }
    }

    fn is_delete(&self) -> bool {
        matches!(self.modification.classify(), Ok(ModificationKind::Delete))
    }
}
