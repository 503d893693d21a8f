//! Collapsing of concurrent deletes of the same record.
//!
//! Several children can report the removal of the same row at nearly the
//! same time, each producing a delete of the one aggregate row they back.
//! The guard lets only the first of those through: a marker is set when the
//! delete is enqueued and cleared when its completion fires. Markers expire
//! after a TTL so a lost completion cannot block later deletes forever, and
//! the set is bounded so a completion storm cannot grow it without limit.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sonic_ha_common::RecordIdentity;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CAPACITY: usize = 10_000;
/// Longest marker lifetime; larger TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Handle to one marker, returned when a delete is admitted.
///
/// Only the holder of the current marker's token can clear it, so a late
/// completion of an expired or evicted delete leaves a newer marker alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeleteToken {
    expires_at: Instant,
    seq: u64,
}

#[derive(Debug, Default)]
struct GuardState {
    markers: HashMap<RecordIdentity, DeleteToken>,
    by_expiry: BTreeMap<DeleteToken, RecordIdentity>,
    seq: u64,
}

impl GuardState {
    fn purge(&mut self, now: Instant) -> usize {
        let mut purged = 0;
        while let Some(entry) = self.by_expiry.first_entry() {
            if entry.key().expires_at > now {
                break;
            }
            let identity = entry.remove();
            self.markers.remove(&identity);
            purged += 1;
        }
        purged
    }

    fn remove(&mut self, identity: &RecordIdentity, token: DeleteToken) -> bool {
        if self.markers.get(identity) != Some(&token) {
            return false;
        }
        self.markers.remove(identity);
        self.by_expiry.remove(&token);
        true
    }
}

/// Bounded, expiring set of in-flight delete markers.
#[derive(Debug)]
pub struct DeleteRaceGuard {
    ttl: Duration,
    capacity: usize,
    state: Mutex<GuardState>,
}

impl Default for DeleteRaceGuard {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl DeleteRaceGuard {
    /// Creates a guard. A zero capacity is treated as one and the TTL is
    /// capped at [`MAX_TTL`].
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl: ttl.min(MAX_TTL),
            capacity: capacity.max(1),
            state: Mutex::new(GuardState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Marks a delete of `identity` as in flight.
    ///
    /// Returns `None` if a live marker already exists; the caller must then
    /// drop its delete. Check and insert happen under one lock. The token
    /// must be handed back to [`DeleteRaceGuard::complete`].
    pub fn try_begin_delete(&self, identity: &RecordIdentity) -> Option<DeleteToken> {
        self.try_begin_delete_at(identity, Instant::now())
    }

    pub(crate) fn try_begin_delete_at(
        &self,
        identity: &RecordIdentity,
        now: Instant,
    ) -> Option<DeleteToken> {
        let mut state = self.state.lock();
        state.purge(now);
        if state.markers.contains_key(identity) {
            return None;
        }

        while state.markers.len() >= self.capacity {
            let Some((_, evicted)) = state.by_expiry.pop_first() else {
                break;
            };
            state.markers.remove(&evicted);
            warn!(identity = %evicted, "Delete guard full, evicting oldest marker");
        }

        state.seq += 1;
        let token = DeleteToken {
            // only reachable near the end of the clock; such a marker expires at once
            expires_at: now.checked_add(self.ttl).unwrap_or(now),
            seq: state.seq,
        };
        state.markers.insert(identity.clone(), token);
        state.by_expiry.insert(token, identity.clone());
        Some(token)
    }

    /// Clears the marker for `identity`, whatever the delete's outcome.
    ///
    /// Does nothing unless `token` is the live marker's token.
    pub fn complete(&self, identity: &RecordIdentity, token: DeleteToken) {
        let mut state = self.state.lock();
        if !state.remove(identity, token) {
            debug!(identity = %identity, "No matching delete marker to clear");
        }
    }

    pub fn is_pending(&self, identity: &RecordIdentity) -> bool {
        self.is_pending_at(identity, Instant::now())
    }

    pub(crate) fn is_pending_at(&self, identity: &RecordIdentity, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.purge(now);
        state.markers.contains_key(identity)
    }

    /// Number of live markers.
    pub fn len(&self) -> usize {
        let mut state = self.state.lock();
        state.purge(Instant::now());
        state.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired markers, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.state.lock().purge(Instant::now())
    }
}
