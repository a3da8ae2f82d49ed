//! Routing statistics
//!
//! Lock-free counters updated on every routing decision.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one motherboard
#[derive(Debug, Default)]
pub struct RoutingStats {
    /// Devices attached
    pub attaches: AtomicU64,
    /// Devices detached
    pub detaches: AtomicU64,
    /// Attached devices re-keyed
    pub renames: AtomicU64,
    /// Unicast messages handed to an application
    pub unicast_delivered: AtomicU64,
    /// Unicast messages that found no device or no listener
    pub unicast_dropped: AtomicU64,
    /// Valid broadcasts fanned out
    pub broadcasts: AtomicU64,
    /// Applications reached by broadcasts
    pub broadcast_deliveries: AtomicU64,
}

impl RoutingStats {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Create a snapshot of current stats
    pub fn snapshot(&self) -> RoutingStatsSnapshot {
        RoutingStatsSnapshot {
            attaches: self.attaches.load(Ordering::Relaxed),
            detaches: self.detaches.load(Ordering::Relaxed),
            renames: self.renames.load(Ordering::Relaxed),
            unicast_delivered: self.unicast_delivered.load(Ordering::Relaxed),
            unicast_dropped: self.unicast_dropped.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            broadcast_deliveries: self.broadcast_deliveries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of routing statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStatsSnapshot {
    pub attaches: u64,
    pub detaches: u64,
    pub renames: u64,
    pub unicast_delivered: u64,
    pub unicast_dropped: u64,
    pub broadcasts: u64,
    pub broadcast_deliveries: u64,
}

impl RoutingStatsSnapshot {
    /// Share of unicast attempts that were delivered (1.0 when there were none)
    pub fn delivery_ratio(&self) -> f64 {
        let attempts = self.unicast_delivered + self.unicast_dropped;
        if attempts == 0 {
            1.0
        } else {
            self.unicast_delivered as f64 / attempts as f64
        }
    }
}
