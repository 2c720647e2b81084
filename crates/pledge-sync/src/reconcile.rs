//! Reconciliation Loop
//!
//! Holds the current [`Snapshot`] and replaces it wholesale after each
//! successful read. Refreshes are triggered by the engine timer, by ledger
//! push events and after confirmed submissions; all three go through
//! [`ReconciliationLoop::trigger_refresh`], which never runs two reads at once.
//!
//! ## Coalescing
//!
//! A trigger that finds a refresh in flight records a pending request and
//! returns immediately. When the in-flight read finishes, the owner runs
//! exactly one more pass if anything was pending, so any number of triggers
//! arriving during one read costs at most one extra read.
//!
//! ## Failures
//!
//! Read failures never replace the current snapshot. They are logged, counted,
//! published as [`ReconcileStatus::Degraded`] and handed to observers as a soft
//! warning.
//!
//! ## Refund flags
//!
//! Refund flags only move from `false` to `true`. A fresh read that un-refunds
//! a contributor seen refunded before has that flag restored before the
//! snapshot is published; everything else in the read is taken as is.

use async_trait::async_trait;
use parking_lot::RwLock;
use pledge_core::{LedgerError, Snapshot};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::guard::InFlight;
use crate::metrics::EngineMetrics;
use crate::reader::SnapshotReader;

/// Receives every published snapshot and every absorbed read failure.
///
/// Observers run inline after each pass, in registration order, before the
/// next pass starts.
#[async_trait]
pub trait SnapshotObserver: Send + Sync {
    /// A new snapshot replaced the previous one
    async fn snapshot_updated(&self, snapshot: Arc<Snapshot>);

    /// A pass failed; the previous snapshot is still current
    async fn refresh_degraded(&self, _error: &LedgerError) {}
}

struct FnObserver<F>(F);

#[async_trait]
impl<F> SnapshotObserver for FnObserver<F>
where
    F: Fn(Arc<Snapshot>) + Send + Sync,
{
    async fn snapshot_updated(&self, snapshot: Arc<Snapshot>) {
        (self.0)(snapshot);
    }
}

/// What the view layer should show about freshness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileStatus {
    /// No pass has run yet
    Idle,
    /// A pass is reading the ledger
    Syncing,
    /// The last pass published `version`
    Synced { version: u64 },
    /// The last pass failed; `version` is the snapshot still shown, if any
    Degraded {
        version: Option<u64>,
        message: String,
    },
}

/// Result of one `trigger_refresh` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Folded into the refresh already in flight
    Coalesced,
    /// This call owned the refresh and ran `passes` reads
    Completed { passes: u32 },
}

/// Owns the current snapshot and the refresh guard
pub struct ReconciliationLoop {
    reader: SnapshotReader,
    snapshot_tx: watch::Sender<Option<Arc<Snapshot>>>,
    status_tx: watch::Sender<ReconcileStatus>,
    refreshing: InFlight,
    pending: AtomicBool,
    observers: RwLock<Vec<Arc<dyn SnapshotObserver>>>,
    metrics: Arc<EngineMetrics>,
}

impl ReconciliationLoop {
    /// Create a loop with no snapshot
    pub fn new(reader: SnapshotReader, metrics: Arc<EngineMetrics>) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        let (status_tx, _) = watch::channel(ReconcileStatus::Idle);
        Self {
            reader,
            snapshot_tx,
            status_tx,
            refreshing: InFlight::new(),
            pending: AtomicBool::new(false),
            observers: RwLock::new(Vec::new()),
            metrics,
        }
    }

    /// Latest published snapshot
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot_tx.borrow().clone()
    }

    /// Watch published snapshots
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.snapshot_tx.subscribe()
    }

    /// Current freshness status
    pub fn status(&self) -> ReconcileStatus {
        self.status_tx.borrow().clone()
    }

    /// Watch freshness status
    pub fn subscribe_status(&self) -> watch::Receiver<ReconcileStatus> {
        self.status_tx.subscribe()
    }

    /// Whether a refresh is currently running
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.is_busy()
    }

    /// Register an observer
    pub fn add_observer(&self, observer: Arc<dyn SnapshotObserver>) {
        self.observers.write().push(observer);
    }

    /// Register a plain callback for published snapshots
    pub fn on_snapshot_updated<F>(&self, handler: F)
    where
        F: Fn(Arc<Snapshot>) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(FnObserver(handler)));
    }

    /// Refresh now, or fold into the refresh already running.
    ///
    /// Returns once this call's passes are done; a coalesced call returns
    /// immediately and its request is served by the current owner.
    pub async fn trigger_refresh(&self) -> RefreshOutcome {
        let mut guard = match self.refreshing.try_acquire() {
            Some(guard) => guard,
            None => {
                self.pending.store(true, Ordering::SeqCst);
                // The owner may have released between our two attempts.
                match self.refreshing.try_acquire() {
                    Some(guard) => {
                        self.pending.store(false, Ordering::SeqCst);
                        guard
                    }
                    None => {
                        EngineMetrics::incr(&self.metrics.refreshes_coalesced_total);
                        debug!("Refresh already in flight; coalesced");
                        return RefreshOutcome::Coalesced;
                    }
                }
            }
        };

        let mut passes = 0;
        loop {
            self.refresh_pass().await;
            passes += 1;

            if self.pending.swap(false, Ordering::SeqCst) {
                continue;
            }
            drop(guard);

            // A trigger can land after the swap but before the release.
            if !self.pending.load(Ordering::SeqCst) {
                break;
            }
            match self.refreshing.try_acquire() {
                Some(next) => {
                    self.pending.store(false, Ordering::SeqCst);
                    guard = next;
                }
                None => break,
            }
        }
        RefreshOutcome::Completed { passes }
    }

    async fn refresh_pass(&self) {
        EngineMetrics::incr(&self.metrics.refreshes_started_total);
        self.status_tx.send_replace(ReconcileStatus::Syncing);

        match self.reader.read_snapshot().await {
            Ok(fresh) => {
                let snapshot = Arc::new(self.keep_refunds_monotonic(fresh));
                let version = snapshot.version;
                self.snapshot_tx.send_replace(Some(snapshot.clone()));
                self.status_tx
                    .send_replace(ReconcileStatus::Synced { version });
                EngineMetrics::incr(&self.metrics.refreshes_completed_total);
                info!(
                    version,
                    campaigns = snapshot.len(),
                    "Published ledger snapshot"
                );

                for observer in self.observers() {
                    observer.snapshot_updated(snapshot.clone()).await;
                }
            }
            Err(err) => {
                EngineMetrics::incr(&self.metrics.refreshes_failed_total);
                let version = self.current_snapshot().map(|s| s.version);
                warn!(
                    error = %err,
                    code = err.code(),
                    transient = err.is_transient(),
                    retained_version = ?version,
                    "Ledger refresh failed; keeping previous snapshot"
                );
                self.status_tx.send_replace(ReconcileStatus::Degraded {
                    version,
                    message: err.to_string(),
                });

                for observer in self.observers() {
                    observer.refresh_degraded(&err).await;
                }
            }
        }
    }

    fn keep_refunds_monotonic(&self, mut fresh: Snapshot) -> Snapshot {
        let Some(previous) = self.current_snapshot() else {
            return fresh;
        };
        let regressions = fresh.refund_regressions(&previous);
        if regressions.is_empty() {
            return fresh;
        }

        EngineMetrics::incr(&self.metrics.stale_snapshots_total);
        for regression in &regressions {
            error!(
                campaign_id = %regression.campaign,
                contributor = %regression.contributor,
                previous_version = previous.version,
                version = fresh.version,
                "Ledger reported a refunded contribution as unrefunded; keeping it refunded"
            );
        }
        fresh.restore_refund_flags(&regressions);
        fresh
    }

    fn observers(&self) -> Vec<Arc<dyn SnapshotObserver>> {
        self.observers.read().clone()
    }
}
