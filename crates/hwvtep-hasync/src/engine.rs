//! Engine wiring: collaborators, listeners and subscriptions.

use std::collections::BTreeMap;
use std::sync::Arc;

use sonic_ha_common::{
    BatchedWriter, DataChange, HaResult, HaTopology, HierarchicalStore, JobScheduler, NodeId,
    Partition, RecordType,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HaSyncConfig;
use crate::delete_guard::DeleteRaceGuard;
use crate::handlers;
use crate::listener::NodeDataListener;
use crate::merge::MergeCommandsAggregator;
use crate::sink::PropagationSink;
use crate::stats::{HaStats, HaStatsSnapshot};

/// External services the engine runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn HierarchicalStore>,
    pub topology: Arc<dyn HaTopology>,
    pub scheduler: Arc<dyn JobScheduler>,
    pub writer: Arc<dyn BatchedWriter>,
}

/// State shared by listeners, jobs and handlers.
pub(crate) struct EngineContext {
    pub(crate) store: Arc<dyn HierarchicalStore>,
    pub(crate) topology: Arc<dyn HaTopology>,
    pub(crate) scheduler: Arc<dyn JobScheduler>,
    pub(crate) aggregator: MergeCommandsAggregator,
    pub(crate) sink: PropagationSink,
    pub(crate) guard: Arc<DeleteRaceGuard>,
    pub(crate) stats: Arc<HaStats>,
}

/// HWVTEP HA replication engine.
///
/// Owns one [`NodeDataListener`] per replicated table and partition.
/// Notifications are fed either by [`HaEngine::start`], which subscribes
/// every listener to the store, or directly through [`HaEngine::dispatch`].
pub struct HaEngine {
    ctx: Arc<EngineContext>,
    listeners: BTreeMap<(RecordType, Partition), Arc<NodeDataListener>>,
}

impl HaEngine {
    /// Builds the engine. Fails if `config` does not validate.
    pub fn new(config: &HaSyncConfig, collaborators: Collaborators) -> HaResult<Self> {
        config.validate()?;
        let guard = Arc::new(DeleteRaceGuard::new(
            config.delete_guard.ttl(),
            config.delete_guard.capacity,
        ));
        let stats = Arc::new(HaStats::new());
        let sink = PropagationSink::new(
            collaborators.writer,
            Arc::clone(&guard),
            Arc::clone(&stats),
            config.merge.create_parents,
        );
        let ctx = Arc::new(EngineContext {
            store: collaborators.store,
            topology: collaborators.topology,
            scheduler: collaborators.scheduler,
            aggregator: MergeCommandsAggregator::new(),
            sink,
            guard,
            stats,
        });

        let listeners = RecordType::ALL
            .into_iter()
            .flat_map(|ty| Partition::ALL.into_iter().map(move |p| (ty, p)))
            .map(|(ty, p)| {
                (
                    (ty, p),
                    Arc::new(NodeDataListener::new(ty, p, Arc::clone(&ctx))),
                )
            })
            .collect();

        Ok(Self { ctx, listeners })
    }

    pub fn listener(&self, record_type: RecordType, partition: Partition) -> Option<&Arc<NodeDataListener>> {
        self.listeners.get(&(record_type, partition))
    }

    pub fn listeners(&self) -> impl Iterator<Item = &Arc<NodeDataListener>> {
        self.listeners.values()
    }

    /// Routes a notification to the listener for its table and partition.
    pub fn dispatch(&self, change: DataChange) {
        match self.listener(change.identity.record_type, change.partition) {
            Some(listener) => listener.on_change(change),
            None => warn!(identity = %change.identity, "No listener registered"),
        }
    }

    /// Subscribes every listener to the store.
    ///
    /// One task per subscription feeds notifications to its listener until
    /// the store closes the stream or the handle is aborted.
    pub fn start(&self) -> EngineHandle {
        let tasks = self
            .listeners
            .iter()
            .map(|(&(record_type, partition), listener)| {
                let mut rx = self.ctx.store.subscribe(partition, record_type);
                let listener = Arc::clone(listener);
                tokio::spawn(async move {
                    while let Some(change) = rx.recv().await {
                        listener.on_change(change);
                    }
                    debug!(table = %record_type, %partition, "Subscription closed");
                })
            })
            .collect::<Vec<_>>();
        info!(subscriptions = tasks.len(), "HA replication engine started");
        EngineHandle { tasks }
    }

    /// Reconciles a (re)connected child with its aggregate in both
    /// directions. Returns false if the node is not HA grouped.
    pub fn on_child_connected(&self, child: &NodeId) -> HaResult<bool> {
        handlers::child_connected(&self.ctx, child)
    }

    /// Clears the aggregate's observed state if `child` was its last
    /// connected backer. Returns true if a cleanup was scheduled.
    pub fn on_child_disconnected(&self, child: &NodeId) -> HaResult<bool> {
        handlers::child_disconnected(&self.ctx, child)
    }

    /// Re-pushes the aggregate's intended data to all connected children.
    pub fn resync_aggregate(&self, parent: &NodeId) -> HaResult<usize> {
        handlers::resync_aggregate(&self.ctx, parent)
    }

    pub fn aggregator(&self) -> &MergeCommandsAggregator {
        &self.ctx.aggregator
    }

    pub fn delete_guard(&self) -> &DeleteRaceGuard {
        &self.ctx.guard
    }

    pub fn stats(&self) -> HaStatsSnapshot {
        self.ctx.stats.snapshot()
    }
}

/// Subscription tasks spawned by [`HaEngine::start`].
#[derive(Debug)]
pub struct EngineHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn subscriptions(&self) -> usize {
        self.tasks.len()
    }

    /// Stops every subscription task.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    /// Aborts the subscriptions and waits for the tasks to finish.
    pub async fn shutdown(self) {
        self.abort();
        for task in self.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Subscription task failed");
                }
            }
        }
    }
}
