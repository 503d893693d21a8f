//! Common HA replication abstractions for SONiC hardware VTEP nodes.
//!
//! This crate provides the types and collaborator traits shared by the
//! HWVTEP HA synchronizer and its test infrastructure:
//!
//! - [`NodeId`] / [`NodeRole`]: identity of aggregate and physical nodes
//! - [`Record`], [`RecordType`], [`RecordIdentity`]: the replicated tables
//! - [`Modification`] / [`DataChange`]: change notifications from the store
//! - [`HierarchicalStore`], [`HaTopology`], [`BatchedWriter`],
//!   [`JobScheduler`]: the in-process collaborator boundary
//! - [`KeyedJobQueue`]: tokio-backed single-flight-per-key scheduler
//! - [`HaError`]: error type for all collaborator operations
//!
//! # Architecture
//!
//! ```text
//!  CONFIG (Intended)                 OPERATIONAL (Observed)
//!  ┌─────────────┐                   ┌─────────────┐
//!  │ aggregate A │──fan-out──┐   ┌──>│ aggregate A │
//!  └─────────────┘           │   │   └─────────────┘
//!                            ▼   │fan-in
//!  ┌────┐ ┌────┐        ┌────┐ ┌────┐
//!  │ C1 │ │ C2 │        │ C1 │ │ C2 │
//!  └────┘ └────┘        └────┘ └────┘
//! ```
//!
//! The store, topology index, writer and scheduler are injected as
//! `Arc<dyn Trait>` handles; nothing in this crate is a global singleton.

mod change;
mod error;
mod mac;
mod node;
mod record;
mod scheduler;
mod store;
mod topology;

pub use change::{ChangeKind, DataChange, Modification, ModificationKind};
pub use error::{HaError, HaResult, ParseError};
pub use mac::MacAddress;
pub use node::{NodeId, NodeRole};
pub use record::{
    Encapsulation, LocatorRef, LogicalSwitch, LogicalSwitchRef, McastMac, McastMacAddress,
    Partition, PhysicalLocator, Record, RecordData, RecordIdentity, RecordType, ReplicationMode,
    TerminationPoint, Tunnel, TunnelIp, UcastMac,
};
pub use scheduler::{Job, JobScheduler, KeyedJobQueue};
pub use store::{BatchedWriter, HierarchicalStore, WriteCompletion};
pub use topology::HaTopology;
