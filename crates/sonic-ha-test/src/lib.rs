//! Test infrastructure for the HWVTEP HA synchronizer
//!
//! Provides:
//! - In-memory hierarchical store with per-table subscriptions
//! - In-memory HA topology index with connectivity toggles
//! - Recording batched writer with optional held completions
//! - Record fixtures for every replicated table
//! - Store verification helpers

pub mod fixtures;
mod memory_store;
mod memory_topology;
mod recording_writer;
mod verification;

pub use fixtures::*;
pub use memory_store::MemoryStore;
pub use memory_topology::MemoryTopology;
pub use recording_writer::{RecordingWriter, WriteCall};
pub use verification::*;
