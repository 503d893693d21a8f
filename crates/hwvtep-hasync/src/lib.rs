//! HWVTEP HA node replication engine.
//!
//! Keeps an aggregate (HA) hardware VTEP node consistent with the physical
//! nodes backing it:
//!
//! - intended data written on the aggregate fans out to every child
//!   ([`MergeDirection::FanOut`]);
//! - observed data reported by a child fans in to the aggregate
//!   ([`MergeDirection::FanIn`]).
//!
//! [`HaEngine`] owns one [`NodeDataListener`] per table and partition. A
//! listener resolves the HA grouping of the changed node and submits one job
//! per target to the keyed [`JobScheduler`](sonic_ha_common::JobScheduler);
//! the job reads the target, derives the single write or delete through the
//! [`MergeCommandsAggregator`] and hands it to the
//! [`BatchedWriter`](sonic_ha_common::BatchedWriter) via a
//! [`PropagationSink`]. Concurrent deletes of the same target row collapse
//! in the [`DeleteRaceGuard`].

pub mod config;
pub mod delete_guard;
pub mod engine;
mod handlers;
pub mod listener;
pub mod logging;
pub mod merge;
pub mod sink;
pub mod stats;

pub use config::{DeleteGuardConfig, HaSyncConfig, LoggingConfig, MergeConfig};
pub use delete_guard::{DeleteRaceGuard, DeleteToken};
pub use engine::{Collaborators, EngineHandle, HaEngine};
pub use listener::NodeDataListener;
pub use merge::{
    command_for, MergeCommand, MergeCommandsAggregator, MergeDirection, MergeOp, MergePlan,
};
pub use sink::PropagationSink;
pub use stats::{HaStats, HaStatsSnapshot};
