//! Boundary traits for the ledger and the wall clock.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: host adapters (ledger node client), `pledge-testkit` mocks
//! - **Usage**: snapshot reader, refund orchestrator, action submitter
//!
//! The ledger adapter owns transport, signing and call timeouts. An
//! unresponsive call must surface as [`LedgerError::Unavailable`] rather than
//! hang.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

use crate::campaign::{CampaignDraft, CampaignRecord};
use crate::errors::{LedgerError, LedgerResult};
use crate::types::{Amount, CampaignId, EscrowRef, Identity, Timestamp};

/// Outcome of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Executed and included
    Confirmed,
    /// Included but execution reverted
    Reverted,
}

/// Receipt for a submitted, confirmed-or-reverted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash as reported by the ledger
    pub tx_hash: String,
    /// Block the transaction was included in
    pub block: u64,
    /// Whether execution succeeded
    pub status: TxStatus,
}

impl TxReceipt {
    /// Treat a reverted receipt as a rejection.
    pub fn into_confirmed(self) -> LedgerResult<TxReceipt> {
        match self.status {
            TxStatus::Confirmed => Ok(self),
            TxStatus::Reverted => Err(LedgerError::rejected(format!(
                "transaction {} reverted",
                self.tx_hash
            ))),
        }
    }
}

/// Kinds of state-change notification the ledger pushes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerEventKind {
    /// A contribution was accepted
    Contributed,
    /// A contributor was refunded
    Refunded,
    /// Campaign status changed
    StatusUpdated,
    /// The creator released escrowed funds
    FundsReleased,
}

/// A state-change notification pushed by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// What happened
    pub kind: LedgerEventKind,
    /// Campaign the event concerns
    pub campaign: CampaignId,
    /// Contributor or creator involved, when the event names one
    pub account: Option<Identity>,
    /// Amount moved, for contribution and refund events
    pub amount: Option<Amount>,
}

impl LedgerEvent {
    /// Event with no account or amount attached.
    pub fn new(kind: LedgerEventKind, campaign: CampaignId) -> Self {
        Self {
            kind,
            campaign,
            account: None,
            amount: None,
        }
    }
}

/// Typed query and submit operations against the ledger.
#[async_trait]
pub trait LedgerEffects: Send + Sync {
    /// Number of campaigns ever created; ids are `[0, count)`.
    async fn campaign_count(&self) -> LedgerResult<u64>;

    /// Summary fields for one campaign.
    async fn campaign(&self, id: CampaignId) -> LedgerResult<CampaignRecord>;

    /// Contributors in first-contribution order.
    async fn contributors(&self, id: CampaignId) -> LedgerResult<Vec<Identity>>;

    /// Accumulated amount contributed by one contributor.
    async fn contribution(&self, id: CampaignId, contributor: &Identity) -> LedgerResult<Amount>;

    /// Whether the contributor's funds have been returned.
    async fn is_refunded(&self, id: CampaignId, contributor: &Identity) -> LedgerResult<bool>;

    /// Current balance held by an escrow.
    async fn escrow_balance(&self, escrow: &EscrowRef) -> LedgerResult<Amount>;

    /// Contribute `amount` from the signing identity.
    async fn submit_contribute(&self, id: CampaignId, amount: Amount) -> LedgerResult<TxReceipt>;

    /// Release escrowed funds to the creator.
    async fn submit_release_funds(&self, id: CampaignId) -> LedgerResult<TxReceipt>;

    /// Refund the signing identity's own contribution.
    async fn submit_refund(&self, id: CampaignId) -> LedgerResult<TxReceipt>;

    /// Refund every contributor of an underfunded campaign.
    async fn submit_initiate_refunds(&self, id: CampaignId) -> LedgerResult<TxReceipt>;

    /// Create a new campaign owned by the signing identity.
    async fn submit_create_campaign(&self, draft: &CampaignDraft) -> LedgerResult<TxReceipt>;

    /// Subscribe to pushed state-change events.
    fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent>;
}

/// Blanket implementation for Arc<T> where T: LedgerEffects
#[async_trait]
impl<T: LedgerEffects + ?Sized> LedgerEffects for Arc<T> {
    async fn campaign_count(&self) -> LedgerResult<u64> {
        (**self).campaign_count().await
    }

    async fn campaign(&self, id: CampaignId) -> LedgerResult<CampaignRecord> {
        (**self).campaign(id).await
    }

    async fn contributors(&self, id: CampaignId) -> LedgerResult<Vec<Identity>> {
        (**self).contributors(id).await
    }

    async fn contribution(&self, id: CampaignId, contributor: &Identity) -> LedgerResult<Amount> {
        (**self).contribution(id, contributor).await
    }

    async fn is_refunded(&self, id: CampaignId, contributor: &Identity) -> LedgerResult<bool> {
        (**self).is_refunded(id, contributor).await
    }

    async fn escrow_balance(&self, escrow: &EscrowRef) -> LedgerResult<Amount> {
        (**self).escrow_balance(escrow).await
    }

    async fn submit_contribute(&self, id: CampaignId, amount: Amount) -> LedgerResult<TxReceipt> {
        (**self).submit_contribute(id, amount).await
    }

    async fn submit_release_funds(&self, id: CampaignId) -> LedgerResult<TxReceipt> {
        (**self).submit_release_funds(id).await
    }

    async fn submit_refund(&self, id: CampaignId) -> LedgerResult<TxReceipt> {
        (**self).submit_refund(id).await
    }

    async fn submit_initiate_refunds(&self, id: CampaignId) -> LedgerResult<TxReceipt> {
        (**self).submit_initiate_refunds(id).await
    }

    async fn submit_create_campaign(&self, draft: &CampaignDraft) -> LedgerResult<TxReceipt> {
        (**self).submit_create_campaign(draft).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent> {
        (**self).subscribe_events()
    }
}

/// Wall-clock time used for deadline comparisons.
pub trait PhysicalClock: Send + Sync {
    fn now(&self) -> Timestamp;
}

impl<T: PhysicalClock + ?Sized> PhysicalClock for Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Operating-system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl PhysicalClock for SystemClock {
    fn now(&self) -> Timestamp {
        // A clock set before 1970 reads as the epoch.
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Timestamp(secs)
    }
}
