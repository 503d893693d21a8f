//! Replication counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live engine counters, shared by the listeners, jobs and the sink.
#[derive(Debug, Default)]
pub struct HaStats {
    notifications: AtomicU64,
    jobs_scheduled: AtomicU64,
    writes_enqueued: AtomicU64,
    deletes_enqueued: AtomicU64,
    noop_skips: AtomicU64,
    unmapped_skips: AtomicU64,
    deletes_collapsed: AtomicU64,
    deletes_suppressed: AtomicU64,
    errors: AtomicU64,
    write_failures: AtomicU64,
    full_merges: AtomicU64,
}

/// Point-in-time copy of [`HaStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HaStatsSnapshot {
    /// Change notifications received by the listeners.
    pub notifications: u64,
    /// Propagation jobs handed to the scheduler.
    pub jobs_scheduled: u64,
    pub writes_enqueued: u64,
    pub deletes_enqueued: u64,
    /// Changes dropped because they would not alter the target.
    pub noop_skips: u64,
    /// Changes on nodes outside any HA group.
    pub unmapped_skips: u64,
    /// Deletes dropped because one was already in flight.
    pub deletes_collapsed: u64,
    /// Observed deletes from disconnected children.
    pub deletes_suppressed: u64,
    /// Collaborator and classification errors.
    pub errors: u64,
    /// Completions that reported a failed write or delete.
    pub write_failures: u64,
    pub full_merges: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl HaStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_notification(&self) {
        bump(&self.notifications);
    }

    pub fn record_job(&self) {
        bump(&self.jobs_scheduled);
    }

    pub fn record_write(&self) {
        bump(&self.writes_enqueued);
    }

    pub fn record_delete(&self) {
        bump(&self.deletes_enqueued);
    }

    pub fn record_noop(&self) {
        bump(&self.noop_skips);
    }

    pub fn record_unmapped(&self) {
        bump(&self.unmapped_skips);
    }

    pub fn record_collapsed_delete(&self) {
        bump(&self.deletes_collapsed);
    }

    pub fn record_suppressed_delete(&self) {
        bump(&self.deletes_suppressed);
    }

    pub fn record_error(&self) {
        bump(&self.errors);
    }

    pub fn record_write_failure(&self) {
        bump(&self.write_failures);
    }

    pub fn record_full_merge(&self) {
        bump(&self.full_merges);
    }

    pub fn snapshot(&self) -> HaStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        HaStatsSnapshot {
            notifications: load(&self.notifications),
            jobs_scheduled: load(&self.jobs_scheduled),
            writes_enqueued: load(&self.writes_enqueued),
            deletes_enqueued: load(&self.deletes_enqueued),
            noop_skips: load(&self.noop_skips),
            unmapped_skips: load(&self.unmapped_skips),
            deletes_collapsed: load(&self.deletes_collapsed),
            deletes_suppressed: load(&self.deletes_suppressed),
            errors: load(&self.errors),
            write_failures: load(&self.write_failures),
            full_merges: load(&self.full_merges),
        }
    }
}
