//! # Pledge Core - Campaign Model and Ledger Boundary
//!
//! This crate provides the foundation shared by every Pledge component:
//! - Identifier, amount and timestamp newtypes
//! - Campaign, escrow and contribution records as the ledger reports them
//! - Immutable, versioned [`Snapshot`]s of all observed campaign state
//! - Refund eligibility and action availability rules
//! - The [`LedgerEffects`] boundary trait and the [`PhysicalClock`] trait
//! - The ledger error taxonomy
//!
//! ## Design Principles
//!
//! - **Ledger Is Truth**: nothing here enforces accounting rules; records mirror
//!   what the ledger reported and checks only flag disagreements
//! - **Copy-on-Replace**: snapshots are never mutated after construction
//! - **Effect Boundaries**: all I/O goes through traits so hosts and tests can
//!   swap implementations

pub mod campaign;
pub mod effects;
pub mod errors;
pub mod policy;
pub mod snapshot;
pub mod types;

pub use campaign::{CampaignDraft, CampaignRecord, CampaignStatus, Contribution, Escrow};
pub use effects::{
    LedgerEffects, LedgerEvent, LedgerEventKind, PhysicalClock, SystemClock, TxReceipt, TxStatus,
};
pub use errors::{LedgerError, LedgerResult, RejectionKind};
pub use policy::{evaluate_refund, is_refund_eligible, ActionAvailability, RefundEligibility};
pub use snapshot::{CampaignState, InvariantViolation, RefundRegression, Snapshot};
pub use types::{Amount, CampaignId, EscrowRef, Identity, MediaRef, Timestamp};
