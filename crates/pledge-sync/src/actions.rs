//! Action Submitter
//!
//! Serialises user-triggered, money-moving operations. Each UI action slot
//! admits one submission at a time; a second call while the slot is busy
//! fails fast with [`ActionError::OperationInProgress`] and never reaches the
//! ledger. Nothing here retries: a submission whose confirmation was merely
//! slow may already have landed, so retrying is the caller's decision.
//!
//! After a confirmed submission the slot is released and a reconciliation
//! pass runs before `submit` returns, so callers see the effect in the next
//! snapshot read from the loop.

use pledge_core::{Amount, CampaignDraft, CampaignId, LedgerEffects, LedgerResult, TxReceipt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::ActionError;
use crate::guard::InFlight;
use crate::metrics::EngineMetrics;
use crate::reconcile::ReconciliationLoop;

/// UI-exposed action slot; one submission in flight per slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionSlot {
    /// Contributing to a campaign
    Contribute,
    /// Creator releasing funds
    Release,
    /// Contributor reclaiming their own contribution
    Refund,
    /// Creating a campaign
    Create,
}

impl ActionSlot {
    /// Every slot
    pub const ALL: [ActionSlot; 4] = [
        ActionSlot::Contribute,
        ActionSlot::Release,
        ActionSlot::Refund,
        ActionSlot::Create,
    ];

    fn index(self) -> usize {
        match self {
            ActionSlot::Contribute => 0,
            ActionSlot::Release => 1,
            ActionSlot::Refund => 2,
            ActionSlot::Create => 3,
        }
    }

    /// Lowercase name for logs and messages
    pub fn label(self) -> &'static str {
        match self {
            ActionSlot::Contribute => "contribute",
            ActionSlot::Release => "release",
            ActionSlot::Refund => "refund",
            ActionSlot::Create => "create",
        }
    }
}

impl fmt::Display for ActionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A state-changing ledger operation a user can request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOperation {
    /// Contribute from the signing identity
    Contribute { campaign: CampaignId, amount: Amount },
    /// Release escrowed funds to the creator
    ReleaseFunds { campaign: CampaignId },
    /// Refund the signing identity's own contribution
    Refund { campaign: CampaignId },
    /// Open a new campaign owned by the signing identity
    CreateCampaign(CampaignDraft),
}

impl LedgerOperation {
    /// Slot this operation occupies while in flight
    pub fn slot(&self) -> ActionSlot {
        match self {
            Self::Contribute { .. } => ActionSlot::Contribute,
            Self::ReleaseFunds { .. } => ActionSlot::Release,
            Self::Refund { .. } => ActionSlot::Refund,
            Self::CreateCampaign(_) => ActionSlot::Create,
        }
    }

    /// Campaign targeted, if the campaign already exists
    pub fn campaign(&self) -> Option<CampaignId> {
        match self {
            Self::Contribute { campaign, .. }
            | Self::ReleaseFunds { campaign }
            | Self::Refund { campaign } => Some(*campaign),
            Self::CreateCampaign(_) => None,
        }
    }

    /// Local checks that need no ledger round trip
    pub fn validate(&self) -> Result<(), ActionError> {
        match self {
            Self::Contribute { amount, .. } if amount.is_zero() => Err(ActionError::InvalidInput(
                "contribution amount must be positive".to_string(),
            )),
            Self::CreateCampaign(draft) => {
                let problems = draft.problems();
                if problems.is_empty() {
                    Ok(())
                } else {
                    Err(ActionError::InvalidInput(problems.join(", ")))
                }
            }
            _ => Ok(()),
        }
    }
}

/// Submits user operations with per-slot busy guards
pub struct ActionSubmitter {
    ledger: Arc<dyn LedgerEffects>,
    reconciler: Arc<ReconciliationLoop>,
    slots: [InFlight; 4],
    metrics: Arc<EngineMetrics>,
}

impl ActionSubmitter {
    /// Create a submitter with every slot idle
    pub fn new(
        ledger: Arc<dyn LedgerEffects>,
        reconciler: Arc<ReconciliationLoop>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            ledger,
            reconciler,
            slots: [
                InFlight::new(),
                InFlight::new(),
                InFlight::new(),
                InFlight::new(),
            ],
            metrics,
        }
    }

    /// Whether `slot` has a submission in flight
    pub fn is_busy(&self, slot: ActionSlot) -> bool {
        self.slots[slot.index()].is_busy()
    }

    /// Validate, submit and confirm one operation, then refresh.
    ///
    /// # Errors
    ///
    /// - [`ActionError::InvalidInput`] before anything is sent
    /// - [`ActionError::OperationInProgress`] if the slot is busy; the ledger
    ///   is not contacted
    /// - [`ActionError::Ledger`] for rejections (including reverted
    ///   receipts) and transport failures
    pub async fn submit(&self, operation: LedgerOperation) -> Result<TxReceipt, ActionError> {
        operation.validate()?;
        let slot = operation.slot();

        let receipt = {
            let Some(_busy) = self.slots[slot.index()].try_acquire() else {
                EngineMetrics::incr(&self.metrics.actions_busy_total);
                debug!(%slot, "Slot busy; submission refused");
                return Err(ActionError::OperationInProgress { slot });
            };
            EngineMetrics::incr(&self.metrics.actions_submitted_total);

            match self
                .dispatch(&operation)
                .await
                .and_then(TxReceipt::into_confirmed)
            {
                Ok(receipt) => receipt,
                Err(err) => {
                    EngineMetrics::incr(&self.metrics.actions_failed_total);
                    warn!(
                        %slot,
                        campaign_id = ?operation.campaign(),
                        error = %err,
                        rejection = ?err.rejection_kind(),
                        "Submission failed"
                    );
                    return Err(err.into());
                }
            }
        };

        info!(
            %slot,
            campaign_id = ?operation.campaign(),
            tx_hash = %receipt.tx_hash,
            block = receipt.block,
            "Submission confirmed"
        );
        self.reconciler.trigger_refresh().await;
        Ok(receipt)
    }

    async fn dispatch(&self, operation: &LedgerOperation) -> LedgerResult<TxReceipt> {
        match operation {
            LedgerOperation::Contribute { campaign, amount } => {
                self.ledger.submit_contribute(*campaign, *amount).await
            }
            LedgerOperation::ReleaseFunds { campaign } => {
                self.ledger.submit_release_funds(*campaign).await
            }
            LedgerOperation::Refund { campaign } => self.ledger.submit_refund(*campaign).await,
            LedgerOperation::CreateCampaign(draft) => {
                self.ledger.submit_create_campaign(draft).await
            }
        }
    }
}
