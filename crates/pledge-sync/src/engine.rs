//! Campaign Engine
//!
//! The single, explicitly constructed context that owns the reconciliation
//! loop, the refund orchestrator, the action submitter and their background
//! tasks. Construction starts from an empty snapshot and an empty session
//! set; [`CampaignEngine::start`] spawns the timer and the push-event
//! listener, [`CampaignEngine::shutdown`] (or drop) stops them.

use pledge_core::{
    ActionAvailability, CampaignId, Identity, LedgerEffects, LedgerEvent, PhysicalClock, Snapshot,
    TxReceipt,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::actions::{ActionSlot, ActionSubmitter, LedgerOperation};
use crate::config::EngineConfig;
use crate::errors::{ActionError, ConfigError};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::reader::SnapshotReader;
use crate::reconcile::{ReconcileStatus, ReconciliationLoop, RefreshOutcome, SnapshotObserver};
use crate::refund::{RefundOrchestrator, ScanOutcome};
use crate::tasks::TaskRegistry;

/// Ledger synchronisation and refund orchestration for one process
pub struct CampaignEngine {
    config: EngineConfig,
    ledger: Arc<dyn LedgerEffects>,
    clock: Arc<dyn PhysicalClock>,
    reconciler: Arc<ReconciliationLoop>,
    refunds: Arc<RefundOrchestrator>,
    submitter: ActionSubmitter,
    focus: watch::Sender<Option<CampaignId>>,
    metrics: Arc<EngineMetrics>,
    tasks: TaskRegistry,
    started: AtomicBool,
}

impl CampaignEngine {
    /// Wire up every component; nothing runs until [`start`](Self::start).
    pub fn new(
        ledger: Arc<dyn LedgerEffects>,
        clock: Arc<dyn PhysicalClock>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let metrics = Arc::new(EngineMetrics::default());
        let reader = SnapshotReader::new(ledger.clone(), clock.clone());
        let reconciler = Arc::new(ReconciliationLoop::new(reader, metrics.clone()));
        let refunds = Arc::new(RefundOrchestrator::new(
            ledger.clone(),
            clock.clone(),
            metrics.clone(),
        ));
        if config.refund_scan_enabled {
            reconciler.add_observer(refunds.clone());
        }
        let submitter = ActionSubmitter::new(ledger.clone(), reconciler.clone(), metrics.clone());
        let (focus, _) = watch::channel(config.focus_campaign);

        Ok(Self {
            config,
            ledger,
            clock,
            reconciler,
            refunds,
            submitter,
            focus,
            metrics,
            tasks: TaskRegistry::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Spawn the refresh timer and the push-event listener, as configured.
    ///
    /// Must be called within a tokio runtime. Calling it again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.config.auto_refresh_enabled {
            let reconciler = self.reconciler.clone();
            self.tasks
                .spawn_interval_until(self.config.refresh_interval(), move || {
                    let reconciler = reconciler.clone();
                    async move {
                        reconciler.trigger_refresh().await;
                        true
                    }
                });
        }

        if self.config.push_events_enabled {
            let events = self.ledger.subscribe_events();
            self.tasks.spawn_cancellable(listen_for_events(
                events,
                self.reconciler.clone(),
                self.focus.subscribe(),
            ));
        }

        info!(
            interval_ms = self.config.refresh_interval_ms,
            timer = self.config.auto_refresh_enabled,
            push = self.config.push_events_enabled,
            refund_scan = self.config.refund_scan_enabled,
            "Campaign engine started"
        );
    }

    /// Stop background tasks; in-flight ledger calls are abandoned
    pub fn shutdown(&self) {
        self.tasks.shutdown();
        info!("Campaign engine stopped");
    }

    /// Background tasks still running
    pub fn active_tasks(&self) -> usize {
        self.tasks.active_tasks()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // View
    // =========================================================================

    /// Latest published snapshot, if any read has succeeded
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.reconciler.current_snapshot()
    }

    /// Watch published snapshots
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.reconciler.subscribe()
    }

    /// Current freshness status
    pub fn status(&self) -> ReconcileStatus {
        self.reconciler.status()
    }

    /// Watch freshness status
    pub fn subscribe_status(&self) -> watch::Receiver<ReconcileStatus> {
        self.reconciler.subscribe_status()
    }

    /// Call `handler` with every published snapshot
    pub fn on_snapshot_updated<F>(&self, handler: F)
    where
        F: Fn(Arc<Snapshot>) + Send + Sync + 'static,
    {
        self.reconciler.on_snapshot_updated(handler);
    }

    /// Register an observer for snapshots and degraded refreshes
    pub fn add_observer(&self, observer: Arc<dyn SnapshotObserver>) {
        self.reconciler.add_observer(observer);
    }

    /// Which actions `viewer` may take on `campaign` per the current snapshot
    pub fn availability(
        &self,
        campaign: CampaignId,
        viewer: Option<&Identity>,
    ) -> Option<ActionAvailability> {
        let snapshot = self.current_snapshot()?;
        let state = snapshot.campaign(campaign)?;
        Some(ActionAvailability::for_viewer(
            state,
            viewer,
            self.clock.now(),
        ))
    }

    // =========================================================================
    // Triggers and submissions
    // =========================================================================

    /// Refresh now or coalesce into the refresh in flight
    pub async fn trigger_refresh(&self) -> RefreshOutcome {
        self.reconciler.trigger_refresh().await
    }

    /// Submit a user operation
    pub async fn submit(&self, operation: LedgerOperation) -> Result<TxReceipt, ActionError> {
        self.submitter.submit(operation).await
    }

    /// Whether a user action slot is busy
    pub fn is_busy(&self, slot: ActionSlot) -> bool {
        self.submitter.is_busy(slot)
    }

    /// Run a refund scan over the current snapshot outside the refresh cycle
    pub async fn run_refund_scan(&self) -> Option<ScanOutcome> {
        let snapshot = self.current_snapshot()?;
        Some(self.refunds.scan(&snapshot).await)
    }

    /// Campaigns whose refund initiation this process has confirmed
    pub fn refunded_this_session(&self) -> BTreeSet<CampaignId> {
        self.refunds.refunded_this_session()
    }

    /// Restrict push-triggered refreshes to one campaign, or `None` for all
    pub fn set_focus(&self, campaign: Option<CampaignId>) {
        self.focus.send_replace(campaign);
        debug!(focus = ?campaign, "Push event focus changed");
    }

    /// Campaign whose push events currently trigger refreshes
    pub fn focus(&self) -> Option<CampaignId> {
        *self.focus.borrow()
    }

    /// Counter values
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn is_relevant(event: &LedgerEvent, focus: Option<CampaignId>) -> bool {
    focus.map_or(true, |id| event.campaign == id)
}

/// Refresh on relevant push events.
///
/// Events already queued when one arrives are drained first, so a burst costs
/// one trigger; anything arriving during that refresh is drained the next
/// time round. A lagged feed refreshes unconditionally.
async fn listen_for_events(
    mut events: broadcast::Receiver<LedgerEvent>,
    reconciler: Arc<ReconciliationLoop>,
    focus: watch::Receiver<Option<CampaignId>>,
) {
    loop {
        let received = events.recv().await;
        let current = *focus.borrow();
        let mut relevant = match received {
            Ok(event) => is_relevant(&event, current),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Ledger event feed lagged; refreshing");
                true
            }
            Err(RecvError::Closed) => {
                debug!("Ledger event feed closed");
                return;
            }
        };

        loop {
            match events.try_recv() {
                Ok(event) => relevant |= is_relevant(&event, current),
                Err(TryRecvError::Lagged(_)) => relevant = true,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        if relevant {
            reconciler.trigger_refresh().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pledge_core::{LedgerEventKind, SystemClock};
    use pledge_testkit::MockLedger;

    #[test]
    fn focus_filters_events() {
        let event = LedgerEvent::new(LedgerEventKind::Contributed, CampaignId(2));
        assert!(is_relevant(&event, None));
        assert!(is_relevant(&event, Some(CampaignId(2))));
        assert!(!is_relevant(&event, Some(CampaignId(3))));
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = EngineConfig {
            refresh_interval_ms: 0,
            ..EngineConfig::default()
        };
        let result = CampaignEngine::new(Arc::new(MockLedger::new()), Arc::new(SystemClock), config);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn start_is_idempotent_and_shutdown_stops_tasks() {
        let engine = CampaignEngine::new(
            Arc::new(MockLedger::new()),
            Arc::new(SystemClock),
            EngineConfig::default(),
        )
        .unwrap();

        engine.start();
        engine.start();
        assert_eq!(engine.active_tasks(), 2);

        engine.shutdown();
        assert_eq!(engine.active_tasks(), 0);
    }

    #[tokio::test]
    async fn manual_engine_only_reads_on_request() {
        let ledger = Arc::new(MockLedger::new());
        let engine = CampaignEngine::new(
            ledger.clone(),
            Arc::new(ledger.clock().clone()),
            EngineConfig::manual_only(),
        )
        .unwrap();
        engine.start();
        assert_eq!(engine.active_tasks(), 0);
        assert!(engine.current_snapshot().is_none());

        engine.trigger_refresh().await;
        assert!(engine.current_snapshot().is_some());
        assert_eq!(engine.metrics().refreshes_completed_total, 1);
    }
}
