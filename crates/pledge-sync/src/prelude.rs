//! Pledge sync prelude.
//!
//! Curated re-exports for hosts embedding the engine.

pub use crate::{
    ActionError, ActionSlot, CampaignEngine, ConfigError, EngineConfig, LedgerOperation,
    MetricsSnapshot, ReconcileStatus, RefreshOutcome, ScanOutcome, SnapshotObserver,
};
pub use pledge_core::{
    ActionAvailability, Amount, CampaignDraft, CampaignId, CampaignStatus, Identity,
    LedgerEffects, LedgerError, LedgerEvent, LedgerEventKind, PhysicalClock, RejectionKind,
    Snapshot, SystemClock, TxReceipt,
};
