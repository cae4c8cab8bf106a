//! Bridge counters and health snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters updated by the bridge as messages settle.
#[derive(Debug, Default)]
pub struct BridgeStats {
    received: AtomicU64,
    committed: AtomicU64,
    dropped: AtomicU64,
    retried: AtomicU64,
    fatal: AtomicU64,
    in_flight: AtomicU64,
}

impl BridgeStats {
    pub(crate) fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fatal(&self) {
        self.fatal.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn settled(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self, running: bool) -> BridgeHealth {
        BridgeHealth {
            running,
            received: self.received.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            fatal: self.fatal.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Health of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeHealth {
    /// Whether the consumption loop is running.
    pub running: bool,
    pub received: u64,
    pub committed: u64,
    pub dropped: u64,
    pub retried: u64,
    pub fatal: u64,
    pub in_flight: u64,
}

impl BridgeHealth {
    /// Running and no fatal failures so far.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.running && self.fatal == 0
    }
}
