//! Verification helpers for HA replication tests
//!
//! Provides assertion helpers over the in-memory store and a polling helper
//! for conditions that settle asynchronously.

use std::future::Future;
use std::time::Duration;

use sonic_ha_common::{NodeId, Partition, Record, RecordIdentity};
use thiserror::Error;

use crate::MemoryStore;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected record '{identity}' not found in {partition}")]
    RecordNotFound {
        partition: Partition,
        identity: String,
    },

    #[error("Unexpected record '{identity}' present in {partition}")]
    UnexpectedRecord {
        partition: Partition,
        identity: String,
    },

    #[error("Value mismatch for '{identity}': expected {expected}, got {actual}")]
    ValueMismatch {
        identity: String,
        expected: String,
        actual: String,
    },

    #[error("Expected {expected} records on {node} in {partition}, found {actual}")]
    RecordCountMismatch {
        node: String,
        partition: Partition,
        expected: usize,
        actual: usize,
    },

    #[error("Condition not met within {0:?}")]
    Timeout(Duration),
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Store verification helper
pub struct StoreVerifier<'a> {
    store: &'a MemoryStore,
}

impl<'a> StoreVerifier<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self { store }
    }

    /// Verify that a record exists with exactly the expected value
    pub fn assert_record(
        &self,
        partition: Partition,
        identity: &RecordIdentity,
        expected: &Record,
    ) -> VerifyResult<()> {
        let actual = self.store.get(partition, identity).ok_or_else(|| {
            VerificationError::RecordNotFound {
                partition,
                identity: identity.to_string(),
            }
        })?;
        if &actual != expected {
            return Err(VerificationError::ValueMismatch {
                identity: identity.to_string(),
                expected: format!("{expected:?}"),
                actual: format!("{actual:?}"),
            });
        }
        Ok(())
    }

    /// Verify that a record does not exist
    pub fn assert_absent(&self, partition: Partition, identity: &RecordIdentity) -> VerifyResult<()> {
        if self.store.get(partition, identity).is_some() {
            return Err(VerificationError::UnexpectedRecord {
                partition,
                identity: identity.to_string(),
            });
        }
        Ok(())
    }

    /// Verify the number of records a node owns in a partition
    pub fn assert_record_count(
        &self,
        partition: Partition,
        node: &NodeId,
        expected: usize,
    ) -> VerifyResult<()> {
        let actual = self.store.records(partition, node).len();
        if actual != expected {
            return Err(VerificationError::RecordCountMismatch {
                node: node.to_string(),
                partition,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> VerifyResult<()>
where
    F: FnMut() -> bool,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| VerificationError::Timeout(timeout))
}

/// Awaits `fut` with a timeout, mapping expiry to a verification error.
pub async fn within<F: Future>(timeout: Duration, fut: F) -> VerifyResult<F::Output> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| VerificationError::Timeout(timeout))
}
