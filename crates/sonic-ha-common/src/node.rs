//! Node identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a hardware VTEP node in the topology.
///
/// Both aggregate (HA) nodes and their physical backers are identified the
/// same way, e.g. `hwvtep://uuid/0fa1...`. The role of a node is not part of
/// its identity; it comes from the HA topology index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node identity.
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identity with `%` and `/` percent-escaped.
    ///
    /// The result never contains `/`, so it cannot be mistaken for a record
    /// identity string.
    pub fn escaped(&self) -> String {
        crate::record::escape_segment(&self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// Role a node plays in an HA group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Logical node representing the whole HA group.
    Aggregate,
    /// One concrete backing device of an HA group.
    Physical,
}

impl NodeRole {
    /// Returns the role name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Aggregate => "aggregate",
            NodeRole::Physical => "physical",
        }
    }
}
