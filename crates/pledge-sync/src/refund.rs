//! Refund Orchestrator
//!
//! Scans each published snapshot for campaigns that missed their goal and
//! submits refund initiation for each of them, once.
//!
//! Two layers keep submissions unique:
//! - the ledger's own per-contributor refund flags, read into every snapshot;
//!   a campaign whose contributions are all flagged is never submitted again,
//!   even by a fresh process
//! - a session set of campaigns already confirmed by this process, which
//!   skips them without evaluating
//!
//! A scan in progress is never re-entered: an overlapping call returns
//! [`ScanOutcome::Skipped`] without touching the ledger. Failed submissions are
//! logged and left eligible; the next scan is the retry.

use async_trait::async_trait;
use parking_lot::Mutex;
use pledge_core::{
    evaluate_refund, CampaignId, LedgerEffects, PhysicalClock, RefundEligibility, Snapshot,
    TxReceipt,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::guard::InFlight;
use crate::metrics::EngineMetrics;
use crate::reconcile::SnapshotObserver;

/// Counts from one completed scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Campaigns checked against the eligibility rule
    pub evaluated: usize,
    /// Campaigns skipped because this session already initiated them
    pub already_initiated: usize,
    /// Refund initiations confirmed during this scan
    pub submitted: usize,
    /// Refund initiations that failed and remain eligible
    pub failed: usize,
}

/// Result of one `scan` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Another scan was running; nothing was evaluated
    Skipped,
    /// The scan ran over every campaign in the snapshot
    Completed(ScanSummary),
}

/// Submits refund initiation for underfunded, expired campaigns
pub struct RefundOrchestrator {
    ledger: Arc<dyn LedgerEffects>,
    clock: Arc<dyn PhysicalClock>,
    refunded_this_session: Mutex<BTreeSet<CampaignId>>,
    scanning: InFlight,
    metrics: Arc<EngineMetrics>,
}

impl RefundOrchestrator {
    /// Create an orchestrator with an empty session set
    pub fn new(
        ledger: Arc<dyn LedgerEffects>,
        clock: Arc<dyn PhysicalClock>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            ledger,
            clock,
            refunded_this_session: Mutex::new(BTreeSet::new()),
            scanning: InFlight::new(),
            metrics,
        }
    }

    /// Whether this session already got a confirmed initiation for `id`
    pub fn is_initiated(&self, id: CampaignId) -> bool {
        self.refunded_this_session.lock().contains(&id)
    }

    /// Campaigns with a confirmed initiation this session
    pub fn refunded_this_session(&self) -> BTreeSet<CampaignId> {
        self.refunded_this_session.lock().clone()
    }

    /// Whether a scan is running
    pub fn is_scanning(&self) -> bool {
        self.scanning.is_busy()
    }

    /// Evaluate every campaign in `snapshot`, sequentially, submitting
    /// refund initiation for each eligible one.
    pub async fn scan(&self, snapshot: &Snapshot) -> ScanOutcome {
        let Some(_scan) = self.scanning.try_acquire() else {
            EngineMetrics::incr(&self.metrics.scans_skipped_total);
            debug!(version = snapshot.version, "Refund scan already running; skipped");
            return ScanOutcome::Skipped;
        };
        EngineMetrics::incr(&self.metrics.scans_total);

        let now = self.clock.now();
        let mut summary = ScanSummary::default();

        for state in snapshot.campaigns() {
            if self.is_initiated(state.id) {
                summary.already_initiated += 1;
                continue;
            }
            summary.evaluated += 1;

            let outstanding = match evaluate_refund(state, now) {
                RefundEligibility::Eligible { outstanding } => outstanding,
                RefundEligibility::NothingOutstanding => {
                    debug!(
                        campaign_id = %state.id,
                        "Every contribution already flagged refunded; not submitting"
                    );
                    continue;
                }
                _ => continue,
            };

            let result = self
                .ledger
                .submit_initiate_refunds(state.id)
                .await
                .and_then(TxReceipt::into_confirmed);

            match result {
                Ok(receipt) => {
                    self.refunded_this_session.lock().insert(state.id);
                    summary.submitted += 1;
                    EngineMetrics::incr(&self.metrics.refunds_initiated_total);
                    info!(
                        campaign_id = %state.id,
                        %outstanding,
                        tx_hash = %receipt.tx_hash,
                        block = receipt.block,
                        "Refund initiation confirmed"
                    );
                }
                Err(err) => {
                    summary.failed += 1;
                    EngineMetrics::incr(&self.metrics.refund_failures_total);
                    warn!(
                        campaign_id = %state.id,
                        error = %err,
                        code = err.code(),
                        "Refund initiation failed; campaign stays eligible"
                    );
                }
            }
        }

        ScanOutcome::Completed(summary)
    }
}

#[async_trait]
impl SnapshotObserver for RefundOrchestrator {
    async fn snapshot_updated(&self, snapshot: Arc<Snapshot>) {
        self.scan(&snapshot).await;
    }
}
