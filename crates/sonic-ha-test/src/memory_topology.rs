//! In-memory HA topology index

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use sonic_ha_common::{HaError, HaResult, HaTopology, NodeId};

#[derive(Default)]
struct TopologyState {
    parents: HashMap<NodeId, NodeId>,
    children: BTreeMap<NodeId, BTreeSet<NodeId>>,
    connected: HashSet<NodeId>,
}

/// Mutable HA grouping used by tests to drive the engine.
#[derive(Default)]
pub struct MemoryTopology {
    state: RwLock<TopologyState>,
    failing: AtomicBool,
}

impl MemoryTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a topology with one aggregate and connected children.
    pub fn with_group(parent: &str, children: &[&str]) -> Self {
        let topology = Self::new();
        for child in children {
            topology.add_child(&NodeId::new(parent), &NodeId::new(*child));
        }
        topology
    }

    /// Groups `child` under `parent` and marks it connected.
    pub fn add_child(&self, parent: &NodeId, child: &NodeId) {
        let mut state = self.state.write();
        state.parents.insert(child.clone(), parent.clone());
        state
            .children
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
        state.connected.insert(child.clone());
    }

    /// Dissolves the grouping of `child`.
    pub fn remove_child(&self, child: &NodeId) {
        let mut state = self.state.write();
        if let Some(parent) = state.parents.remove(child) {
            if let Some(children) = state.children.get_mut(&parent) {
                children.remove(child);
                if children.is_empty() {
                    state.children.remove(&parent);
                }
            }
        }
        state.connected.remove(child);
    }

    pub fn set_connected(&self, node: &NodeId, connected: bool) {
        let mut state = self.state.write();
        if connected {
            state.connected.insert(node.clone());
        } else {
            state.connected.remove(node);
        }
    }

    /// Makes every lookup fail with a topology error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, node: &NodeId) -> HaResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HaError::topology(node, "injected lookup failure"));
        }
        Ok(())
    }
}

impl HaTopology for MemoryTopology {
    fn parent(&self, node: &NodeId) -> HaResult<Option<NodeId>> {
        self.check(node)?;
        Ok(self.state.read().parents.get(node).cloned())
    }

    fn children(&self, node: &NodeId) -> HaResult<BTreeSet<NodeId>> {
        self.check(node)?;
        Ok(self
            .state
            .read()
            .children
            .get(node)
            .cloned()
            .unwrap_or_default())
    }

    fn is_connected(&self, node: &NodeId) -> HaResult<bool> {
        self.check(node)?;
        Ok(self.state.read().connected.contains(node))
    }
}
