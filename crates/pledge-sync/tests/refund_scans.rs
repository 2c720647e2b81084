//! Refund orchestration: exactly-once initiation and non-reentrant scans.

use pledge_core::{CampaignId, LedgerError, PhysicalClock, Snapshot};
use pledge_sync::{EngineMetrics, RefundOrchestrator, ScanOutcome, ScanSummary, SnapshotReader};
use pledge_testkit::{
    alice, bob, init_test_tracing, CampaignFixture, Fault, LedgerMethod, MockLedger,
};
use std::sync::Arc;

struct Fixture {
    ledger: Arc<MockLedger>,
    reader: SnapshotReader,
    orchestrator: Arc<RefundOrchestrator>,
}

impl Fixture {
    fn new() -> Self {
        init_test_tracing();
        let ledger = Arc::new(MockLedger::new());
        let clock = Arc::new(ledger.clock().clone());
        let reader = SnapshotReader::new(ledger.clone(), clock.clone());
        let orchestrator = Arc::new(RefundOrchestrator::new(
            ledger.clone(),
            clock,
            Arc::new(EngineMetrics::default()),
        ));
        Self {
            ledger,
            reader,
            orchestrator,
        }
    }

    /// Campaign 0 from the classic scenario: goal 1000, deadline already
    /// past, 300 from A and 200 from B contributed before it passed.
    fn underfunded(&self) -> CampaignId {
        let deadline = self.ledger.clock().now().minus_secs(1);
        self.ledger.install(
            CampaignFixture::new(1_000, deadline)
                .contribution(alice(), 300)
                .contribution(bob(), 200),
        )
    }

    async fn snapshot(&self) -> Arc<Snapshot> {
        Arc::new(self.reader.read_snapshot().await.unwrap())
    }
}

fn completed(outcome: ScanOutcome) -> ScanSummary {
    match outcome {
        ScanOutcome::Completed(summary) => summary,
        ScanOutcome::Skipped => panic!("scan was skipped"),
    }
}

#[tokio::test]
async fn ten_scans_submit_once() {
    let f = Fixture::new();
    let id = f.underfunded();
    assert_eq!(id, CampaignId(0));

    let snapshot = f.snapshot().await;
    assert_eq!(snapshot.campaign(id).unwrap().record.total_funds.0, 500);

    for _ in 0..10 {
        completed(f.orchestrator.scan(&snapshot).await);
    }

    assert_eq!(f.ledger.initiate_refund_calls(id), 1);
    assert!(f.orchestrator.refunded_this_session().contains(&id));
}

#[tokio::test]
async fn unchanged_snapshot_after_success_submits_nothing() {
    let f = Fixture::new();
    let id = f.underfunded();
    let snapshot = f.snapshot().await;

    let first = completed(f.orchestrator.scan(&snapshot).await);
    assert_eq!(first.submitted, 1);

    let second = completed(f.orchestrator.scan(&snapshot).await);
    assert_eq!(second.submitted, 0);
    assert_eq!(second.already_initiated, 1);
    assert_eq!(f.ledger.initiate_refund_calls(id), 1);
}

#[tokio::test]
async fn fresh_snapshots_each_cycle_still_submit_once() {
    let f = Fixture::new();
    let id = f.underfunded();

    for _ in 0..10 {
        let snapshot = f.snapshot().await;
        completed(f.orchestrator.scan(&snapshot).await);
    }

    assert_eq!(f.ledger.initiate_refund_calls(id), 1);
    let last = f.snapshot().await;
    let state = last.campaign(id).unwrap();
    assert!(state.fully_refunded());
    assert!(state.outstanding().is_zero());
}

#[tokio::test]
async fn overlapping_scan_is_skipped() {
    let f = Fixture::new();
    let id = f.underfunded();
    let snapshot = f.snapshot().await;

    f.ledger.hold(LedgerMethod::InitiateRefunds);
    let first = {
        let orchestrator = f.orchestrator.clone();
        let snapshot = snapshot.clone();
        tokio::spawn(async move { orchestrator.scan(&snapshot).await })
    };
    f.ledger.wait_entered(LedgerMethod::InitiateRefunds).await;
    assert!(f.orchestrator.is_scanning());

    assert_eq!(f.orchestrator.scan(&snapshot).await, ScanOutcome::Skipped);
    assert_eq!(f.ledger.initiate_refund_calls(id), 1);

    f.ledger.open(LedgerMethod::InitiateRefunds);
    let summary = completed(first.await.unwrap());
    assert_eq!(summary.submitted, 1);
    assert_eq!(f.ledger.initiate_refund_calls(id), 1);
    assert!(!f.orchestrator.is_scanning());
}

#[tokio::test]
async fn concurrent_scans_submit_once() {
    let f = Fixture::new();
    let id = f.underfunded();
    let snapshot = f.snapshot().await;

    f.ledger.hold(LedgerMethod::InitiateRefunds);
    let scans: Vec<_> = (0..4)
        .map(|_| {
            let orchestrator = f.orchestrator.clone();
            let snapshot = snapshot.clone();
            tokio::spawn(async move { orchestrator.scan(&snapshot).await })
        })
        .collect();
    f.ledger.wait_entered(LedgerMethod::InitiateRefunds).await;
    // Let every other scan reach the guard before releasing the first.
    tokio::task::yield_now().await;
    f.ledger.open(LedgerMethod::InitiateRefunds);

    let outcomes = futures::future::join_all(scans).await;
    let ran = outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap())
        .filter(|outcome| *outcome != ScanOutcome::Skipped)
        .count();
    assert!(ran >= 1);
    assert_eq!(f.ledger.initiate_refund_calls(id), 1);
}

#[tokio::test]
async fn failure_on_one_campaign_does_not_block_the_rest() {
    let f = Fixture::new();
    let first = f.underfunded();
    let second = f.underfunded();
    f.ledger.inject(
        LedgerMethod::InitiateRefunds,
        Fault::Error(LedgerError::unavailable("gateway timeout")),
    );

    let summary = completed(f.orchestrator.scan(&*f.snapshot().await).await);

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.submitted, 1);
    assert!(!f.orchestrator.refunded_this_session().contains(&first));
    assert!(f.orchestrator.refunded_this_session().contains(&second));

    // The failed campaign is retried on the next cycle.
    let retry = completed(f.orchestrator.scan(&*f.snapshot().await).await);
    assert_eq!(retry.submitted, 1);
    assert_eq!(f.ledger.initiate_refund_calls(first), 2);
    assert_eq!(f.ledger.initiate_refund_calls(second), 1);
}

#[tokio::test]
async fn ledger_rejection_leaves_campaign_eligible() {
    let f = Fixture::new();
    let id = f.underfunded();
    f.ledger.inject(
        LedgerMethod::InitiateRefunds,
        Fault::Error(LedgerError::rejected("Campaign status does not allow refunds")),
    );
    let snapshot = f.snapshot().await;

    let summary = completed(f.orchestrator.scan(&snapshot).await);

    assert_eq!(summary.failed, 1);
    assert!(f.orchestrator.refunded_this_session().is_empty());
    assert_eq!(f.ledger.initiate_refund_calls(id), 1);
}
