//! HA topology index collaborator.

use std::collections::BTreeSet;

use crate::{HaResult, NodeId, NodeRole};

/// Read-only view of the HA grouping of nodes.
///
/// The mapping is owned by whatever forms HA groups; the replication engine
/// only reads it. Lookups are fallible so that an unavailable index can be
/// logged and the affected job dropped.
pub trait HaTopology: Send + Sync {
    /// Returns the aggregate parent of a physical node, if it is HA-grouped.
    fn parent(&self, node: &NodeId) -> HaResult<Option<NodeId>>;

    /// Returns the physical children of an aggregate node.
    fn children(&self, node: &NodeId) -> HaResult<BTreeSet<NodeId>>;

    /// Returns true if the physical node currently has a live session.
    fn is_connected(&self, node: &NodeId) -> HaResult<bool>;

    /// Returns the role of a node, or `None` if it is not HA-grouped.
    fn role(&self, node: &NodeId) -> HaResult<Option<NodeRole>> {
        if self.parent(node)?.is_some() {
            return Ok(Some(NodeRole::Physical));
        }
        if !self.children(node)?.is_empty() {
            return Ok(Some(NodeRole::Aggregate));
        }
        Ok(None)
    }
}
