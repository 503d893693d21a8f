//! Error types for HA replication operations.
//!
//! Every collaborator call (store read, topology lookup, write completion)
//! reports failures through [`HaError`]. The engine logs these and drops the
//! affected job; none of them is fatal to the process.

use std::io;
use thiserror::Error;

/// Result type alias for HA replication operations.
pub type HaResult<T> = Result<T, HaError>;

/// Errors that can occur while replicating HA node data.
#[derive(Debug, Error)]
pub enum HaError {
    /// Reading from or subscribing to the hierarchical store failed.
    #[error("Store operation failed: {operation}: {message}")]
    Store {
        /// The operation that failed (e.g., "read", "read_node").
        operation: String,
        /// Error message.
        message: String,
    },

    /// HA topology lookup failed.
    #[error("Topology lookup failed for {node}: {message}")]
    Topology {
        /// The node being resolved.
        node: String,
        /// Error message.
        message: String,
    },

    /// A batched write or delete was rejected by the store.
    #[error("Write failed for {identity}: {message}")]
    Write {
        /// Identity of the record being written or deleted.
        identity: String,
        /// Error message.
        message: String,
    },

    /// The modification type of a notification could not be determined.
    #[error("Cannot classify modification of {identity}: {reason}")]
    UnclassifiableModification {
        /// Identity of the modified record.
        identity: String,
        /// Why classification failed.
        reason: String,
    },

    /// A record or key failed validation.
    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] ParseError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl HaError {
    /// Creates a store error.
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a topology error.
    pub fn topology(node: impl ToString, message: impl Into<String>) -> Self {
        Self::Topology {
            node: node.to_string(),
            message: message.into(),
        }
    }

    /// Creates a write error.
    pub fn write(identity: impl ToString, message: impl Into<String>) -> Self {
        Self::Write {
            identity: identity.to_string(),
            message: message.into(),
        }
    }

    /// Creates an unclassifiable modification error.
    pub fn unclassifiable(identity: impl ToString, reason: impl Into<String>) -> Self {
        Self::UnclassifiableModification {
            identity: identity.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true if a later notification for the same record may succeed.
    ///
    /// Store, topology and write failures are transient; a malformed
    /// notification or record will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HaError::Store { .. } | HaError::Topology { .. } | HaError::Write { .. }
        )
    }
}

/// Parse failures for MAC addresses and record keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid record type: {0}")]
    InvalidRecordType(String),
}
