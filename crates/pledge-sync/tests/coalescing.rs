//! Trailing-edge coalescing of refresh triggers.

use pledge_core::{LedgerError, PhysicalClock};
use pledge_sync::{EngineMetrics, ReconciliationLoop, RefreshOutcome, SnapshotReader};
use pledge_testkit::{alice, init_test_tracing, CampaignFixture, Fault, LedgerMethod, MockLedger};
use std::sync::Arc;

fn reconciler(ledger: &Arc<MockLedger>) -> Arc<ReconciliationLoop> {
    let reader = SnapshotReader::new(ledger.clone(), Arc::new(ledger.clock().clone()));
    Arc::new(ReconciliationLoop::new(
        reader,
        Arc::new(EngineMetrics::default()),
    ))
}

#[tokio::test]
async fn triggers_during_inflight_refresh_cost_one_extra_read() {
    init_test_tracing();
    let ledger = Arc::new(MockLedger::new());
    let deadline = ledger.clock().now().plus_secs(60);
    ledger.install(CampaignFixture::new(1_000, deadline).contribution(alice(), 10));
    let reconciler = reconciler(&ledger);

    ledger.hold(LedgerMethod::CampaignCount);
    let owner = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.trigger_refresh().await })
    };
    ledger.wait_entered(LedgerMethod::CampaignCount).await;
    assert!(reconciler.is_refreshing());

    for _ in 0..25 {
        assert_eq!(reconciler.trigger_refresh().await, RefreshOutcome::Coalesced);
    }
    ledger.open(LedgerMethod::CampaignCount);

    assert_eq!(owner.await.unwrap(), RefreshOutcome::Completed { passes: 2 });
    assert_eq!(ledger.calls(LedgerMethod::CampaignCount), 2);
    assert!(!reconciler.is_refreshing());
}

#[tokio::test]
async fn lone_trigger_reads_once() {
    let ledger = Arc::new(MockLedger::new());
    let reconciler = reconciler(&ledger);

    assert_eq!(
        reconciler.trigger_refresh().await,
        RefreshOutcome::Completed { passes: 1 }
    );
    assert_eq!(ledger.calls(LedgerMethod::CampaignCount), 1);
}

#[tokio::test]
async fn follow_up_pass_sees_newer_state() {
    let ledger = Arc::new(MockLedger::new());
    let deadline = ledger.clock().now().plus_secs(60);
    let id = ledger.install(CampaignFixture::new(1_000, deadline));
    let reconciler = reconciler(&ledger);

    ledger.hold(LedgerMethod::CampaignCount);
    let owner = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.trigger_refresh().await })
    };
    ledger.wait_entered(LedgerMethod::CampaignCount).await;

    // Lands on the ledger while the first read is parked.
    ledger.contribute_as(id, &alice(), 400).unwrap();
    reconciler.trigger_refresh().await;
    ledger.open(LedgerMethod::CampaignCount);
    owner.await.unwrap();

    let snapshot = reconciler.current_snapshot().unwrap();
    assert_eq!(snapshot.campaign(id).unwrap().outstanding().0, 400);
}

#[tokio::test]
async fn failing_pass_releases_guard() {
    let ledger = Arc::new(MockLedger::new());
    let reconciler = reconciler(&ledger);
    ledger.inject(
        LedgerMethod::CampaignCount,
        Fault::Error(LedgerError::unavailable("connection reset")),
    );

    assert_eq!(
        reconciler.trigger_refresh().await,
        RefreshOutcome::Completed { passes: 1 }
    );
    assert!(reconciler.current_snapshot().is_none());
    assert!(!reconciler.is_refreshing());

    reconciler.trigger_refresh().await;
    assert!(reconciler.current_snapshot().is_some());
}

#[tokio::test]
async fn snapshots_replace_whole() {
    let ledger = Arc::new(MockLedger::new());
    let deadline = ledger.clock().now().plus_secs(60);
    let id = ledger.install(CampaignFixture::new(1_000, deadline));
    let reconciler = reconciler(&ledger);

    reconciler.trigger_refresh().await;
    let held = reconciler.current_snapshot().unwrap();

    ledger.contribute_as(id, &alice(), 75).unwrap();
    reconciler.trigger_refresh().await;

    // The old Arc is untouched by the newer publication.
    assert!(held.campaign(id).unwrap().contributions.is_empty());
    let fresh = reconciler.current_snapshot().unwrap();
    assert_eq!(fresh.campaign(id).unwrap().contributions.len(), 1);
    assert!(fresh.version > held.version);
}
