//! Operational counters for the engine
//!
//! Counters follow Prometheus naming (`*_total`) and are plain relaxed
//! atomics; [`EngineMetrics::snapshot`] gives a serialisable copy.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by every engine component
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Read passes started by the reconciliation loop
    pub refreshes_started_total: AtomicU64,
    /// Read passes that published a snapshot
    pub refreshes_completed_total: AtomicU64,
    /// Read passes that kept the previous snapshot
    pub refreshes_failed_total: AtomicU64,
    /// Triggers folded into an in-flight refresh
    pub refreshes_coalesced_total: AtomicU64,
    /// Reads whose regressed refund flags were restored before publication
    pub stale_snapshots_total: AtomicU64,
    /// Refund scans that ran
    pub scans_total: AtomicU64,
    /// Refund scans skipped because one was already running
    pub scans_skipped_total: AtomicU64,
    /// Refund initiations confirmed by the ledger
    pub refunds_initiated_total: AtomicU64,
    /// Refund initiations that failed and stay eligible
    pub refund_failures_total: AtomicU64,
    /// User submissions that reached the ledger
    pub actions_submitted_total: AtomicU64,
    /// User submissions the ledger refused or that failed in transport
    pub actions_failed_total: AtomicU64,
    /// User submissions refused locally because the slot was busy
    pub actions_busy_total: AtomicU64,
}

impl EngineMetrics {
    /// Increment one counter
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            refreshes_started_total: load(&self.refreshes_started_total),
            refreshes_completed_total: load(&self.refreshes_completed_total),
            refreshes_failed_total: load(&self.refreshes_failed_total),
            refreshes_coalesced_total: load(&self.refreshes_coalesced_total),
            stale_snapshots_total: load(&self.stale_snapshots_total),
            scans_total: load(&self.scans_total),
            scans_skipped_total: load(&self.scans_skipped_total),
            refunds_initiated_total: load(&self.refunds_initiated_total),
            refund_failures_total: load(&self.refund_failures_total),
            actions_submitted_total: load(&self.actions_submitted_total),
            actions_failed_total: load(&self.actions_failed_total),
            actions_busy_total: load(&self.actions_busy_total),
        }
    }
}

/// Serialisable copy of [`EngineMetrics`]; fields match the counters there
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub refreshes_started_total: u64,
    pub refreshes_completed_total: u64,
    pub refreshes_failed_total: u64,
    pub refreshes_coalesced_total: u64,
    pub stale_snapshots_total: u64,
    pub scans_total: u64,
    pub scans_skipped_total: u64,
    pub refunds_initiated_total: u64,
    pub refund_failures_total: u64,
    pub actions_submitted_total: u64,
    pub actions_failed_total: u64,
    pub actions_busy_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let metrics = EngineMetrics::default();
        EngineMetrics::incr(&metrics.scans_total);
        EngineMetrics::incr(&metrics.scans_total);
        EngineMetrics::incr(&metrics.actions_busy_total);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.scans_total, 2);
        assert_eq!(snapshot.actions_busy_total, 1);
        assert_eq!(snapshot.refreshes_started_total, 0);
    }
}
