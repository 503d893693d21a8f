//! Node connect and disconnect handling.
//!
//! Incremental propagation only covers changes made while a child is
//! connected. When a child (re)connects, both directions are reconciled
//! with a full merge; when the last child of an aggregate goes away the
//! aggregate's observed state is cleared, since nothing backs it anymore.
//!
//! Node-level jobs are keyed by the escaped node id. A full merge only
//! plans from node snapshots. Each planned operation runs as its own job
//! under the target record's identity, the same key the incremental jobs
//! for that record use, and re-reads both records before acting. A change
//! that lands between the snapshot and the job is thus never overwritten
//! with stale data.

use std::sync::Arc;

use sonic_ha_common::{HaResult, NodeId, Partition, RecordIdentity};
use tracing::{debug, info, trace, warn};

use crate::engine::EngineContext;
use crate::merge::{MergeDirection, MergeOp};

/// Schedules a full reconciliation of `child` with its aggregate.
///
/// Returns false if `child` is not part of an HA group.
pub(crate) fn child_connected(ctx: &Arc<EngineContext>, child: &NodeId) -> HaResult<bool> {
    let Some(parent) = ctx.topology.parent(child)? else {
        debug!(node = %child, "Connected node is not part of an HA group");
        return Ok(false);
    };

    info!(child = %child, parent = %parent, "Child connected, scheduling full merge");
    let job_ctx = Arc::clone(ctx);
    let child = child.clone();
    ctx.scheduler.submit(
        child.escaped(),
        Box::pin(async move {
            full_merge(&job_ctx, MergeDirection::FanIn, &child, &parent).await;
            full_merge(&job_ctx, MergeDirection::FanOut, &parent, &child).await;
        }),
    );
    ctx.stats.record_job();
    Ok(true)
}

/// Clears the aggregate's observed state once no child remains connected.
///
/// Returns true if the cleanup was scheduled.
pub(crate) fn child_disconnected(ctx: &Arc<EngineContext>, child: &NodeId) -> HaResult<bool> {
    let Some(parent) = ctx.topology.parent(child)? else {
        return Ok(false);
    };

    if let Some(backer) = connected_child(ctx, &parent, Some(child))? {
        debug!(child = %child, backer = %backer, "Aggregate still backed, keeping observed state");
        return Ok(false);
    }

    info!(child = %child, parent = %parent, "Last child disconnected, clearing aggregate state");
    let job_ctx = Arc::clone(ctx);
    ctx.scheduler.submit(
        parent.escaped(),
        Box::pin(async move {
            let records = match job_ctx.store.read_node(Partition::Observed, &parent).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(node = %parent, error = %e, "Failed to read aggregate state");
                    job_ctx.stats.record_error();
                    return;
                }
            };
            for record in records {
                let identity = record.identity();
                let ctx = Arc::clone(&job_ctx);
                let parent = parent.clone();
                job_ctx.scheduler.submit(
                    identity.to_string(),
                    Box::pin(clear_record(ctx, parent, identity)),
                );
                job_ctx.stats.record_job();
            }
        }),
    );
    ctx.stats.record_job();
    Ok(true)
}

/// Schedules a fan-out full merge to every connected child of `parent`.
///
/// Returns the number of children scheduled.
pub(crate) fn resync_aggregate(ctx: &Arc<EngineContext>, parent: &NodeId) -> HaResult<usize> {
    let mut scheduled = 0;
    for child in ctx.topology.children(parent)? {
        if !ctx.topology.is_connected(&child)? {
            continue;
        }
        let job_ctx = Arc::clone(ctx);
        let parent = parent.clone();
        ctx.scheduler.submit(
            child.escaped(),
            Box::pin(async move {
                full_merge(&job_ctx, MergeDirection::FanOut, &parent, &child).await;
            }),
        );
        ctx.stats.record_job();
        scheduled += 1;
    }
    debug!(parent = %parent, children = scheduled, "Scheduled aggregate resync");
    Ok(scheduled)
}

/// First connected child of `parent` other than `except`.
fn connected_child(
    ctx: &EngineContext,
    parent: &NodeId,
    except: Option<&NodeId>,
) -> HaResult<Option<NodeId>> {
    for sibling in ctx.topology.children(parent)? {
        if Some(&sibling) != except && ctx.topology.is_connected(&sibling)? {
            return Ok(Some(sibling));
        }
    }
    Ok(None)
}

async fn full_merge(
    ctx: &Arc<EngineContext>,
    direction: MergeDirection,
    source: &NodeId,
    target: &NodeId,
) {
    let partition = direction.partition();
    let source_records = match ctx.store.read_node(partition, source).await {
        Ok(records) => records,
        Err(e) => {
            warn!(node = %source, %direction, error = %e, "Failed to read merge source");
            ctx.stats.record_error();
            return;
        }
    };
    let existing = match ctx.store.read_node(partition, target).await {
        Ok(records) => records,
        Err(e) => {
            warn!(node = %target, %direction, error = %e, "Failed to read merge target");
            ctx.stats.record_error();
            return;
        }
    };

    let plan = ctx
        .aggregator
        .plan_full_merge(direction, &source_records, target, &existing);
    debug!(
        %direction,
        target = %target,
        writes = plan.write_count(),
        deletes = plan.delete_count(),
        "Scheduling full merge"
    );
    // submission follows dependency order; each record then waits behind
    // any incremental job already queued for it
    for op in plan.ops {
        let identity = op.identity().clone();
        let job_ctx = Arc::clone(ctx);
        let source = source.clone();
        ctx.scheduler.submit(
            identity.to_string(),
            Box::pin(reconcile_record(job_ctx, direction, source, identity)),
        );
        ctx.stats.record_job();
    }
    ctx.stats.record_full_merge();
}

/// Re-derives and applies the full-merge operation for one target record.
async fn reconcile_record(
    ctx: Arc<EngineContext>,
    direction: MergeDirection,
    source: NodeId,
    target: RecordIdentity,
) {
    let partition = direction.partition();
    let source_identity = RecordIdentity::new(source, target.record_type, target.key.clone());
    let current = match ctx.store.read(partition, &source_identity).await {
        Ok(current) => current,
        Err(e) => {
            warn!(identity = %source_identity, error = %e, "Source read failed, dropping job");
            ctx.stats.record_error();
            return;
        }
    };
    let existing = match ctx.store.read(partition, &target).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!(identity = %target, error = %e, "Target read failed, dropping job");
            ctx.stats.record_error();
            return;
        }
    };

    match ctx
        .aggregator
        .reconcile_record(direction, &target, current.as_ref(), existing.as_ref())
    {
        Some(op) => {
            ctx.sink.apply(op);
        }
        None => {
            trace!(identity = %target, "Already reconciled");
            ctx.stats.record_noop();
        }
    }
}

/// Deletes one aggregate observed record if it still exists and no child
/// has reconnected since the cleanup was scheduled.
async fn clear_record(ctx: Arc<EngineContext>, parent: NodeId, identity: RecordIdentity) {
    match connected_child(&ctx, &parent, None) {
        Ok(None) => {}
        Ok(Some(backer)) => {
            debug!(identity = %identity, backer = %backer, "Aggregate backed again, keeping record");
            return;
        }
        Err(e) => {
            warn!(node = %parent, error = %e, "Connectivity check failed, dropping job");
            ctx.stats.record_error();
            return;
        }
    }

    match ctx.store.read(Partition::Observed, &identity).await {
        Ok(Some(_)) => {
            ctx.sink.apply(MergeOp::Delete {
                partition: Partition::Observed,
                identity,
            });
        }
        Ok(None) => {
            trace!(identity = %identity, "Record already gone");
            ctx.stats.record_noop();
        }
        Err(e) => {
            warn!(identity = %identity, error = %e, "Record read failed, dropping job");
            ctx.stats.record_error();
        }
    }
}
