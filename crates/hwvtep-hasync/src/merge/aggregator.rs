//! Dispatch of merges to the per-table commands.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use sonic_ha_common::{
    HaResult, Modification, ModificationKind, NodeId, Partition, Record, RecordIdentity,
    RecordType,
};
use tracing::trace;

use super::commands::{command_for, MergeCommand};

/// Direction of a merge between an aggregate and its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeDirection {
    /// Aggregate intended data to a child (config replication).
    FanOut,
    /// Child observed data to the aggregate (state aggregation).
    FanIn,
}

impl MergeDirection {
    /// Partition read from the source and written on the target.
    pub fn partition(&self) -> Partition {
        match self {
            MergeDirection::FanOut => Partition::Intended,
            MergeDirection::FanIn => Partition::Observed,
        }
    }

    /// Direction driven by changes in `partition`.
    pub fn for_partition(partition: Partition) -> Self {
        match partition {
            Partition::Intended => MergeDirection::FanOut,
            Partition::Observed => MergeDirection::FanIn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeDirection::FanOut => "fan-out",
            MergeDirection::FanIn => "fan-in",
        }
    }
}

impl fmt::Display for MergeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single derived operation on a target node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOp {
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

impl MergeOp {
    pub fn identity(&self) -> &RecordIdentity {
        match self {
            MergeOp::Write { identity, .. } | MergeOp::Delete { identity, .. } => identity,
        }
    }

    pub fn partition(&self) -> Partition {
        match self {
            MergeOp::Write { partition, .. } | MergeOp::Delete { partition, .. } => *partition,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, MergeOp::Delete { .. })
    }
}

/// Operations a full merge would perform, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    pub ops: Vec<MergeOp>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn write_count(&self) -> usize {
        self.ops.iter().filter(|op| !op.is_delete()).count()
    }

    pub fn delete_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_delete()).count()
    }
}

/// Referenced tables come first so writes never point at a missing row.
/// Deletes are applied in the reverse order.
fn dependency_rank(record_type: RecordType) -> u8 {
    match record_type {
        RecordType::LogicalSwitch => 0,
        RecordType::PhysicalLocator => 1,
        RecordType::TunnelIp => 2,
        RecordType::TerminationPoint => 3,
        RecordType::Tunnel => 4,
        RecordType::LocalUcastMac
        | RecordType::RemoteUcastMac
        | RecordType::LocalMcastMac
        | RecordType::RemoteMcastMac => 5,
    }
}

/// Registry of merge commands plus the per-direction skip tables.
///
/// `observed_skip` lists tables a child's observed data is never merged
/// into its aggregate for: rows the aggregate programs itself (remote MACs,
/// tunnels, locators) or that stay device local (termination points,
/// local multicast). `intended_skip` lists tables that are never fanned out
/// from the aggregate's config: local unicast MACs are learnt by each
/// device on its own.
pub struct MergeCommandsAggregator {
    commands: BTreeMap<RecordType, &'static dyn MergeCommand>,
    observed_skip: BTreeSet<RecordType>,
    intended_skip: BTreeSet<RecordType>,
}

impl fmt::Debug for MergeCommandsAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeCommandsAggregator")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("observed_skip", &self.observed_skip)
            .field("intended_skip", &self.intended_skip)
            .finish()
    }
}

impl Default for MergeCommandsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeCommandsAggregator {
    /// Creates an aggregator with every table registered and the default
    /// skip tables.
    pub fn new() -> Self {
        Self {
            commands: RecordType::ALL
                .into_iter()
                .map(|ty| (ty, command_for(ty)))
                .collect(),
            observed_skip: BTreeSet::from([
                RecordType::RemoteUcastMac,
                RecordType::RemoteMcastMac,
                RecordType::TerminationPoint,
                RecordType::LocalMcastMac,
                RecordType::PhysicalLocator,
                RecordType::Tunnel,
            ]),
            intended_skip: BTreeSet::from([RecordType::LocalUcastMac]),
        }
    }

    pub fn command(&self, record_type: RecordType) -> Option<&'static dyn MergeCommand> {
        self.commands.get(&record_type).copied()
    }

    pub fn commands(&self) -> impl Iterator<Item = &'static dyn MergeCommand> + '_ {
        self.commands.values().copied()
    }

    pub fn is_skipped(&self, direction: MergeDirection, record_type: RecordType) -> bool {
        match direction {
            MergeDirection::FanOut => self.intended_skip.contains(&record_type),
            MergeDirection::FanIn => self.observed_skip.contains(&record_type),
        }
    }

    /// Returns true if changes of `record_type` propagate in `direction`.
    pub fn is_eligible(&self, direction: MergeDirection, record_type: RecordType) -> bool {
        self.commands.contains_key(&record_type) && !self.is_skipped(direction, record_type)
    }

    /// Identity the copy of `record` has on `target`.
    pub fn target_identity(&self, target: &NodeId, record: &Record) -> RecordIdentity {
        match self.command(record.record_type()) {
            Some(cmd) => cmd.generate_identity(target, record),
            None => record.identity_on(target),
        }
    }

    /// Computes the writes and deletes that bring `target` in line with
    /// `source`.
    ///
    /// `existing` is the target's current data in the direction's partition.
    /// Only records whose transformed value differs from the existing one
    /// are written. Stale target records are deleted for fan-out only: the
    /// aggregate's config is authoritative for its children, whereas an
    /// aggregate's observed row may still be backed by another child.
    pub fn plan_full_merge(
        &self,
        direction: MergeDirection,
        source: &[Record],
        target: &NodeId,
        existing: &[Record],
    ) -> MergePlan {
        let partition = direction.partition();
        let existing: BTreeMap<RecordIdentity, &Record> = existing
            .iter()
            .filter(|r| self.is_eligible(direction, r.record_type()))
            .map(|r| (r.identity_on(target), r))
            .collect();

        let mut desired = BTreeSet::new();
        let mut writes = Vec::new();
        for src in source {
            if !self.is_eligible(direction, src.record_type()) {
                continue;
            }
            let Some(cmd) = self.command(src.record_type()) else {
                continue;
            };
            let identity = cmd.generate_identity(target, src);
            let record = cmd.transform(target, src);
            desired.insert(identity.clone());

            if existing.get(&identity).is_some_and(|cur| **cur == record) {
                continue;
            }
            writes.push(MergeOp::Write {
                partition,
                identity,
                record,
            });
        }
        writes.sort_by_key(|op| dependency_rank(op.identity().record_type));

        let mut deletes = Vec::new();
        if direction == MergeDirection::FanOut {
            deletes.extend(
                existing
                    .keys()
                    .filter(|id| !desired.contains(*id))
                    .map(|id| MergeOp::Delete {
                        partition,
                        identity: id.clone(),
                    }),
            );
            deletes.sort_by_key(|op| std::cmp::Reverse(dependency_rank(op.identity().record_type)));
        }

        writes.extend(deletes);
        MergePlan { ops: writes }
    }

    /// Recomputes the full-merge operation for one target record.
    ///
    /// `source` and `existing` are the records currently stored for the
    /// source node and for `target` under the same natural key. A missing
    /// source deletes the target on fan-out only, as in
    /// [`plan_full_merge`](Self::plan_full_merge).
    pub fn reconcile_record(
        &self,
        direction: MergeDirection,
        target: &RecordIdentity,
        source: Option<&Record>,
        existing: Option<&Record>,
    ) -> Option<MergeOp> {
        if !self.is_eligible(direction, target.record_type) {
            return None;
        }
        let partition = direction.partition();
        match source {
            Some(src) => {
                let record = self.command(src.record_type())?.transform(&target.node, src);
                if existing == Some(&record) {
                    return None;
                }
                Some(MergeOp::Write {
                    partition,
                    identity: target.clone(),
                    record,
                })
            }
            None if direction == MergeDirection::FanOut && existing.is_some() => {
                Some(MergeOp::Delete {
                    partition,
                    identity: target.clone(),
                })
            }
            None => None,
        }
    }

    /// Derives the single operation on `target` for one source modification.
    ///
    /// `existing` is the target record currently stored under the derived
    /// identity. Returns `Ok(None)` when there is nothing to do.
    pub fn incremental_merge(
        &self,
        direction: MergeDirection,
        target: &NodeId,
        modification: &Modification,
        existing: Option<&Record>,
    ) -> HaResult<Option<MergeOp>> {
        let kind = modification.classify()?;
        let Some(record) = modification.record() else {
            trace!(%direction, target = %target, "Modification carries no record, skipping");
            return Ok(None);
        };
        let record_type = record.record_type();
        let Some(cmd) = self
            .command(record_type)
            .filter(|_| self.is_eligible(direction, record_type))
        else {
            trace!(%direction, table = %record_type, "Table not merged in this direction");
            return Ok(None);
        };
        let partition = direction.partition();

        match kind {
            ModificationKind::Delete => {
                let Some(before) = &modification.before else {
                    trace!(%direction, target = %target, "Delete without before image, skipping");
                    return Ok(None);
                };
                let identity = cmd.generate_identity(target, before);
                if existing.is_none() {
                    trace!(identity = %identity, "Target record already absent");
                    return Ok(None);
                }
                Ok(Some(MergeOp::Delete {
                    partition,
                    identity,
                }))
            }
            ModificationKind::Write | ModificationKind::SubtreeModified => {
                if modification.is_noop() {
                    trace!(identity = %record.identity(), "Unchanged update, skipping");
                    return Ok(None);
                }
                let Some(after) = &modification.after else {
                    return Ok(None);
                };
                let identity = cmd.generate_identity(target, after);
                let record = cmd.transform(target, after);
                if existing == Some(&record) {
                    trace!(identity = %identity, "Target already up to date");
                    return Ok(None);
                }
                Ok(Some(MergeOp::Write {
                    partition,
                    identity,
                    record,
                }))
            }
        }
    }
}
