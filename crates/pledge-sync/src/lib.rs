#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # Pledge Sync - Ledger Reconciliation and Refund Orchestration
//!
//! This crate keeps a client-side view of crowdfunding campaigns in step with
//! the ledger and drives the operations that move money:
//! - Snapshot reader pulling every campaign, contribution and escrow balance
//! - Reconciliation loop with trailing-edge coalescing of timer, push-event
//!   and post-submission triggers
//! - Refund orchestrator submitting refund initiation once per eligible
//!   campaign, with a non-reentrant scan
//! - Action submitter with one in-flight submission per UI slot
//! - [`CampaignEngine`], the context object that wires them together
//!
//! ## Design Principles
//!
//! - **Ledger Is Truth**: local state is a copy; read failures keep the last
//!   good copy, never a patched one
//! - **Copy-on-Replace**: snapshots are published whole behind an `Arc`
//! - **Check-Then-Set Guards**: every mutual-exclusion point is one atomic
//!   compare-and-swap released on drop
//! - **No Silent Retries**: money-moving submissions are never retried by this
//!   crate; refund scans retry only by running again

pub mod actions;
pub mod config;
pub mod engine;
pub mod errors;
pub mod guard;
pub mod metrics;
pub mod prelude;
pub mod reader;
pub mod reconcile;
pub mod refund;
pub mod tasks;

pub use actions::{ActionSlot, ActionSubmitter, LedgerOperation};
pub use config::EngineConfig;
pub use engine::CampaignEngine;
pub use errors::{ActionError, ConfigError};
pub use guard::{InFlight, InFlightGuard};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use reader::SnapshotReader;
pub use reconcile::{ReconcileStatus, ReconciliationLoop, RefreshOutcome, SnapshotObserver};
pub use refund::{RefundOrchestrator, ScanOutcome, ScanSummary};
pub use tasks::TaskRegistry;
