//! Campaign Snapshot Reader
//!
//! Pulls every campaign and its derived fields from the ledger into a fresh
//! [`Snapshot`]. Reads go campaign by campaign: all fields of campaign `i` are
//! read before campaign `i + 1` is touched, which bounds the staleness window
//! per campaign. No cross-campaign consistency is attempted.

use pledge_core::{
    CampaignId, CampaignState, Contribution, Escrow, LedgerEffects, LedgerResult, PhysicalClock,
    Snapshot,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Builds snapshots from sequential ledger reads
pub struct SnapshotReader {
    ledger: Arc<dyn LedgerEffects>,
    clock: Arc<dyn PhysicalClock>,
    last_version: AtomicU64,
}

impl SnapshotReader {
    /// Create a reader; the first snapshot gets version 1
    pub fn new(ledger: Arc<dyn LedgerEffects>, clock: Arc<dyn PhysicalClock>) -> Self {
        Self {
            ledger,
            clock,
            last_version: AtomicU64::new(0),
        }
    }

    /// Read the complete observable state.
    ///
    /// # Errors
    ///
    /// Any adapter failure aborts the read and is returned unchanged:
    /// `Unavailable` for transport problems, `Query` for a failed field read.
    pub async fn read_snapshot(&self) -> LedgerResult<Snapshot> {
        let count = self.ledger.campaign_count().await?;
        let mut campaigns = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for id in CampaignId::range(count) {
            campaigns.push(self.read_campaign(id).await?);
        }

        let observed_at = self.clock.now();
        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;

        for state in &campaigns {
            for violation in state.invariant_violations(observed_at) {
                error!(
                    campaign_id = %state.id,
                    version,
                    ?violation,
                    "Observed campaign state violates a ledger invariant"
                );
            }
        }

        debug!(version, campaigns = campaigns.len(), "Snapshot read");
        Ok(Snapshot::new(version, observed_at, campaigns))
    }

    async fn read_campaign(&self, id: CampaignId) -> LedgerResult<CampaignState> {
        let record = self.ledger.campaign(id).await?;
        let contributors = self.ledger.contributors(id).await?;

        let mut contributions = Vec::with_capacity(contributors.len());
        for contributor in contributors {
            let amount = self.ledger.contribution(id, &contributor).await?;
            let refunded = self.ledger.is_refunded(id, &contributor).await?;
            contributions.push(Contribution {
                contributor,
                amount,
                refunded,
            });
        }

        let balance = self.ledger.escrow_balance(&record.escrow).await?;
        Ok(CampaignState {
            id,
            escrow: Escrow {
                reference: record.escrow.clone(),
                balance,
            },
            record,
            contributions,
        })
    }
}
