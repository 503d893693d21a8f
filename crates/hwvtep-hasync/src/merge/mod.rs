//! Record merging between an aggregate node and its children.
//!
//! [`commands`] holds one stateless command per replicated table;
//! [`aggregator`] dispatches to them and applies the per-direction skip
//! tables for both full and incremental merges.

pub mod aggregator;
pub mod commands;

pub use aggregator::{MergeCommandsAggregator, MergeDirection, MergeOp, MergePlan};
pub use commands::{command_for, MergeCommand};
