//! In-memory ledger for deterministic testing
//!
//! `MockLedger` implements [`LedgerEffects`] with simplified crowdfunding
//! rules, and adds the hooks tests need:
//! - per-method call counters (and per-campaign refund-initiation counters)
//! - queued fault injection (errors or reverted receipts)
//! - a sticky outage switch that fails every call as `Unavailable`
//! - gates that park a method until the test releases it, for driving
//!   overlapping calls deterministically
//! - direct state manipulation (fixtures, deadline settlement, stale reads)
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` because locks are never held across `.await`
//! and every critical section is a handful of map operations.

use async_trait::async_trait;
use parking_lot::Mutex;
use pledge_core::{
    Amount, CampaignDraft, CampaignId, CampaignRecord, CampaignStatus, EscrowRef, Identity,
    LedgerEffects, LedgerError, LedgerEvent, LedgerEventKind, LedgerResult, PhysicalClock,
    TxReceipt, TxStatus,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify, Semaphore};
use uuid::Uuid;

use crate::clock::ControllableClock;
use crate::fixtures::{creator, CampaignFixture};

const EVENT_CAPACITY: usize = 256;
const OPEN_GATE_PERMITS: usize = 1 << 20;

/// Ledger boundary operations, for counting, faults and gates.
///
/// One variant per `LedgerEffects` method except `subscribe_events`.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LedgerMethod {
    CampaignCount,
    Campaign,
    Contributors,
    Contribution,
    IsRefunded,
    EscrowBalance,
    Contribute,
    ReleaseFunds,
    Refund,
    InitiateRefunds,
    CreateCampaign,
}

/// Injected failure for the next call of a method
#[derive(Clone, Debug)]
pub enum Fault {
    /// Fail with this error
    Error(LedgerError),
    /// Mine the transaction but revert it (submissions only)
    Revert,
}

#[derive(Debug)]
struct Gate {
    permits: Semaphore,
    entered: Notify,
}

impl Gate {
    fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    async fn pass(&self) {
        self.entered.notify_one();
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

#[derive(Debug)]
struct MockCampaign {
    record: CampaignRecord,
    contributors: Vec<Identity>,
    amounts: HashMap<Identity, Amount>,
    refunded: HashSet<Identity>,
    escrow_balance: Amount,
}

impl MockCampaign {
    fn outstanding_of(&self, who: &Identity) -> Amount {
        if self.refunded.contains(who) {
            Amount::ZERO
        } else {
            self.amounts.get(who).copied().unwrap_or_default()
        }
    }

    fn refund_one(&mut self, who: &Identity) -> Amount {
        let amount = self.outstanding_of(who);
        self.refunded.insert(who.clone());
        self.record.total_funds = self.record.total_funds.saturating_sub(amount);
        self.escrow_balance = self.escrow_balance.saturating_sub(amount);
        amount
    }

    fn all_refunded(&self) -> bool {
        self.contributors
            .iter()
            .all(|who| self.outstanding_of(who).is_zero())
    }
}

#[derive(Debug)]
struct LedgerState {
    campaigns: Vec<MockCampaign>,
    block: u64,
    caller: Identity,
    outage: Option<String>,
    faults: HashMap<LedgerMethod, VecDeque<Fault>>,
    calls: HashMap<LedgerMethod, usize>,
    initiate_calls: HashMap<CampaignId, usize>,
}

impl LedgerState {
    fn get(&self, id: CampaignId, operation: &str) -> LedgerResult<&MockCampaign> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.campaigns.get(i))
            .ok_or_else(|| LedgerError::query(operation, format!("campaign {id} does not exist")))
    }

    fn get_mut(&mut self, id: CampaignId) -> LedgerResult<&mut MockCampaign> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.campaigns.get_mut(i))
            .ok_or_else(|| LedgerError::rejected("Campaign does not exist"))
    }

    fn receipt(&mut self, status: TxStatus) -> TxReceipt {
        self.block += 1;
        TxReceipt {
            tx_hash: format!("0x{}", Uuid::new_v4().simple()),
            block: self.block,
            status,
        }
    }
}

/// In-memory crowdfunding ledger
#[derive(Debug)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
    gates: Mutex<HashMap<LedgerMethod, Arc<Gate>>>,
    events: broadcast::Sender<LedgerEvent>,
    clock: ControllableClock,
}

impl MockLedger {
    /// Empty ledger on a fresh controllable clock
    pub fn new() -> Self {
        Self::with_clock(ControllableClock::default())
    }

    /// Empty ledger sharing `clock`
    pub fn with_clock(clock: ControllableClock) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(LedgerState {
                campaigns: Vec::new(),
                block: 0,
                caller: creator(),
                outage: None,
                faults: HashMap::new(),
                calls: HashMap::new(),
                initiate_calls: HashMap::new(),
            }),
            gates: Mutex::new(HashMap::new()),
            events,
            clock,
        }
    }

    /// Clock used for deadline rules
    pub fn clock(&self) -> &ControllableClock {
        &self.clock
    }

    /// Identity that signs subsequent submissions
    pub fn set_caller(&self, caller: Identity) {
        self.state.lock().caller = caller;
    }

    // =========================================================================
    // Direct state manipulation
    // =========================================================================

    /// Install a campaign as-is, returning its id
    pub fn install(&self, fixture: CampaignFixture) -> CampaignId {
        let mut state = self.state.lock();
        let id = CampaignId(state.campaigns.len() as u64);

        let mut contributors = Vec::new();
        let mut amounts: HashMap<Identity, Amount> = HashMap::new();
        let mut refunded = HashSet::new();
        for (who, amount, was_refunded) in fixture.contributions {
            if !amounts.contains_key(&who) {
                contributors.push(who.clone());
            }
            let entry = amounts.entry(who.clone()).or_default();
            *entry = entry.checked_add(amount).unwrap_or(Amount(u128::MAX));
            if was_refunded {
                refunded.insert(who);
            }
        }
        let total: Amount = contributors
            .iter()
            .filter(|who| !refunded.contains(*who))
            .filter_map(|who| amounts.get(who))
            .sum();

        state.campaigns.push(MockCampaign {
            record: CampaignRecord {
                creator: fixture.creator,
                title: fixture.title,
                description: fixture.description,
                goal: fixture.goal,
                deadline: fixture.deadline,
                total_funds: total,
                status: fixture.status,
                funds_released: fixture.funds_released,
                media_refs: fixture.media_refs,
                escrow: EscrowRef(format!("escrow-{id}")),
            },
            contributors,
            amounts,
            refunded,
            escrow_balance: if fixture.funds_released {
                Amount::ZERO
            } else {
                total
            },
        });
        id
    }

    /// Contribute as `who`, applying ledger rules
    pub fn contribute_as(
        &self,
        id: CampaignId,
        who: &Identity,
        amount: u128,
    ) -> LedgerResult<TxReceipt> {
        self.apply_contribute(id, who.clone(), Amount(amount))
    }

    /// Record the ledger's deadline transition for every due campaign
    pub fn settle_deadlines(&self) {
        let now = self.clock.now();
        let mut settled = Vec::new();
        {
            let mut state = self.state.lock();
            for (i, campaign) in state.campaigns.iter_mut().enumerate() {
                let record = &mut campaign.record;
                if record.status == CampaignStatus::Active && record.deadline_passed(now) {
                    record.status = if record.total_funds >= record.goal {
                        CampaignStatus::Completed
                    } else {
                        CampaignStatus::Failed
                    };
                    settled.push(CampaignId(i as u64));
                }
            }
        }
        for id in settled {
            self.emit(LedgerEvent::new(LedgerEventKind::StatusUpdated, id));
        }
    }

    /// Overwrite a campaign's status without emitting anything
    pub fn set_status(&self, id: CampaignId, status: CampaignStatus) {
        if let Some(campaign) = self.state.lock().campaigns.get_mut(id.0 as usize) {
            campaign.record.status = status;
        }
    }

    /// Report `who` as not refunded again, imitating a lagging ledger node
    pub fn regress_refund(&self, id: CampaignId, who: &Identity) {
        if let Some(campaign) = self.state.lock().campaigns.get_mut(id.0 as usize) {
            campaign.refunded.remove(who);
        }
    }

    /// Current record of a campaign
    pub fn record(&self, id: CampaignId) -> Option<CampaignRecord> {
        self.state
            .lock()
            .campaigns
            .get(id.0 as usize)
            .map(|c| c.record.clone())
    }

    /// Push an event to subscribers
    pub fn emit(&self, event: LedgerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // =========================================================================
    // Faults and gates
    // =========================================================================

    /// Fail every call with `Unavailable` until cleared
    pub fn set_outage(&self, reason: Option<&str>) {
        self.state.lock().outage = reason.map(str::to_string);
    }

    /// Queue a fault for the next call of `method`
    pub fn inject(&self, method: LedgerMethod, fault: Fault) {
        self.state
            .lock()
            .faults
            .entry(method)
            .or_default()
            .push_back(fault);
    }

    /// Park calls of `method` until released
    pub fn hold(&self, method: LedgerMethod) {
        self.gates
            .lock()
            .entry(method)
            .or_insert_with(|| Arc::new(Gate::new()));
    }

    /// Let `count` parked (or future) calls of `method` through
    pub fn release(&self, method: LedgerMethod, count: usize) {
        if let Some(gate) = self.gates.lock().get(&method) {
            gate.permits.add_permits(count);
        }
    }

    /// Remove the gate on `method`, unblocking everything parked on it
    pub fn open(&self, method: LedgerMethod) {
        if let Some(gate) = self.gates.lock().remove(&method) {
            gate.permits.add_permits(OPEN_GATE_PERMITS);
        }
    }

    /// Wait until a call of `method` has reached its gate
    pub async fn wait_entered(&self, method: LedgerMethod) {
        let gate = self.gates.lock().get(&method).cloned();
        if let Some(gate) = gate {
            gate.entered.notified().await;
        }
    }

    /// Calls made to `method`, including failed ones
    pub fn calls(&self, method: LedgerMethod) -> usize {
        self.state.lock().calls.get(&method).copied().unwrap_or(0)
    }

    /// Refund-initiation submissions for one campaign, including failed ones
    pub fn initiate_refund_calls(&self, id: CampaignId) -> usize {
        self.state
            .lock()
            .initiate_calls
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    async fn begin(&self, method: LedgerMethod) -> LedgerResult<bool> {
        *self.state.lock().calls.entry(method).or_default() += 1;

        let gate = self.gates.lock().get(&method).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let mut state = self.state.lock();
        if let Some(reason) = &state.outage {
            return Err(LedgerError::unavailable(reason.clone()));
        }
        match state.faults.get_mut(&method).and_then(VecDeque::pop_front) {
            Some(Fault::Error(err)) => Err(err),
            Some(Fault::Revert) => Ok(true),
            None => Ok(false),
        }
    }

    fn reverted(&self) -> TxReceipt {
        self.state.lock().receipt(TxStatus::Reverted)
    }

    // =========================================================================
    // Ledger rules
    // =========================================================================

    fn apply_contribute(
        &self,
        id: CampaignId,
        who: Identity,
        amount: Amount,
    ) -> LedgerResult<TxReceipt> {
        let now = self.clock.now();
        let receipt = {
            let mut state = self.state.lock();
            let campaign = state.get_mut(id)?;
            if campaign.record.status != CampaignStatus::Active {
                return Err(LedgerError::rejected("Campaign is not active"));
            }
            if campaign.record.deadline_passed(now) {
                return Err(LedgerError::rejected("Deadline has passed"));
            }
            if amount.is_zero() {
                return Err(LedgerError::rejected("Contribution must be positive"));
            }
            if !campaign.amounts.contains_key(&who) {
                campaign.contributors.push(who.clone());
            }
            let entry = campaign.amounts.entry(who.clone()).or_default();
            *entry = entry
                .checked_add(amount)
                .ok_or_else(|| LedgerError::rejected("Contribution overflow"))?;
            campaign.record.total_funds = campaign
                .record
                .total_funds
                .checked_add(amount)
                .ok_or_else(|| LedgerError::rejected("Contribution overflow"))?;
            campaign.escrow_balance = campaign.record.total_funds;
            state.receipt(TxStatus::Confirmed)
        };
        self.emit(LedgerEvent {
            kind: LedgerEventKind::Contributed,
            campaign: id,
            account: Some(who),
            amount: Some(amount),
        });
        Ok(receipt)
    }

    fn apply_release(&self, id: CampaignId) -> LedgerResult<TxReceipt> {
        let (receipt, creator, amount) = {
            let mut state = self.state.lock();
            let caller = state.caller.clone();
            let campaign = state.get_mut(id)?;
            if campaign.record.creator != caller {
                return Err(LedgerError::rejected("Only creator can release funds"));
            }
            if campaign.record.status != CampaignStatus::Completed {
                return Err(LedgerError::rejected("Campaign not completed"));
            }
            if campaign.record.funds_released {
                return Err(LedgerError::rejected("Funds already released"));
            }
            campaign.record.funds_released = true;
            let amount = campaign.escrow_balance;
            campaign.escrow_balance = Amount::ZERO;
            let creator = campaign.record.creator.clone();
            (state.receipt(TxStatus::Confirmed), creator, amount)
        };
        self.emit(LedgerEvent {
            kind: LedgerEventKind::FundsReleased,
            campaign: id,
            account: Some(creator),
            amount: Some(amount),
        });
        Ok(receipt)
    }

    fn apply_refund(&self, id: CampaignId) -> LedgerResult<TxReceipt> {
        let (receipt, who, amount, finished) = {
            let mut state = self.state.lock();
            let caller = state.caller.clone();
            let campaign = state.get_mut(id)?;
            if campaign.record.status != CampaignStatus::Failed {
                return Err(LedgerError::rejected("Campaign not failed"));
            }
            if campaign.outstanding_of(&caller).is_zero() {
                return Err(LedgerError::rejected("No contribution to refund"));
            }
            let amount = campaign.refund_one(&caller);
            let finished = campaign.all_refunded();
            if finished {
                campaign.record.status = CampaignStatus::Refunded;
            }
            (state.receipt(TxStatus::Confirmed), caller, amount, finished)
        };
        self.emit(LedgerEvent {
            kind: LedgerEventKind::Refunded,
            campaign: id,
            account: Some(who),
            amount: Some(amount),
        });
        if finished {
            self.emit(LedgerEvent::new(LedgerEventKind::StatusUpdated, id));
        }
        Ok(receipt)
    }

    fn apply_initiate_refunds(&self, id: CampaignId) -> LedgerResult<TxReceipt> {
        let now = self.clock.now();
        let (receipt, refunds) = {
            let mut state = self.state.lock();
            let campaign = state.get_mut(id)?;
            if !campaign.record.deadline_passed(now) {
                return Err(LedgerError::rejected("Deadline not reached"));
            }
            if campaign.record.status == CampaignStatus::Refunded {
                return Err(LedgerError::rejected("Campaign already refunded"));
            }
            if campaign.record.total_funds >= campaign.record.goal {
                return Err(LedgerError::rejected("Goal was met"));
            }
            let pending: Vec<Identity> = campaign
                .contributors
                .iter()
                .filter(|who| !campaign.outstanding_of(who).is_zero())
                .cloned()
                .collect();
            let refunds: Vec<(Identity, Amount)> = pending
                .into_iter()
                .map(|who| {
                    let amount = campaign.refund_one(&who);
                    (who, amount)
                })
                .collect();
            campaign.record.status = CampaignStatus::Refunded;
            (state.receipt(TxStatus::Confirmed), refunds)
        };
        for (who, amount) in refunds {
            self.emit(LedgerEvent {
                kind: LedgerEventKind::Refunded,
                campaign: id,
                account: Some(who),
                amount: Some(amount),
            });
        }
        self.emit(LedgerEvent::new(LedgerEventKind::StatusUpdated, id));
        Ok(receipt)
    }

    fn apply_create(&self, draft: &CampaignDraft) -> LedgerResult<TxReceipt> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let id = CampaignId(state.campaigns.len() as u64);
        let creator = state.caller.clone();
        state.campaigns.push(MockCampaign {
            record: CampaignRecord {
                creator,
                title: draft.title.clone(),
                description: draft.description.clone(),
                goal: draft.goal,
                deadline: now.plus_secs(draft.duration_secs),
                total_funds: Amount::ZERO,
                status: CampaignStatus::Active,
                funds_released: false,
                media_refs: draft.media_refs.clone(),
                escrow: EscrowRef(format!("escrow-{id}")),
            },
            contributors: Vec::new(),
            amounts: HashMap::new(),
            refunded: HashSet::new(),
            escrow_balance: Amount::ZERO,
        });
        Ok(state.receipt(TxStatus::Confirmed))
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerEffects for MockLedger {
    async fn campaign_count(&self) -> LedgerResult<u64> {
        self.begin(LedgerMethod::CampaignCount).await?;
        Ok(self.state.lock().campaigns.len() as u64)
    }

    async fn campaign(&self, id: CampaignId) -> LedgerResult<CampaignRecord> {
        self.begin(LedgerMethod::Campaign).await?;
        let state = self.state.lock();
        state.get(id, "getCampaign").map(|c| c.record.clone())
    }

    async fn contributors(&self, id: CampaignId) -> LedgerResult<Vec<Identity>> {
        self.begin(LedgerMethod::Contributors).await?;
        let state = self.state.lock();
        state
            .get(id, "getContributors")
            .map(|c| c.contributors.clone())
    }

    async fn contribution(&self, id: CampaignId, contributor: &Identity) -> LedgerResult<Amount> {
        self.begin(LedgerMethod::Contribution).await?;
        let state = self.state.lock();
        state
            .get(id, "getContribution")
            .map(|c| c.amounts.get(contributor).copied().unwrap_or_default())
    }

    async fn is_refunded(&self, id: CampaignId, contributor: &Identity) -> LedgerResult<bool> {
        self.begin(LedgerMethod::IsRefunded).await?;
        let state = self.state.lock();
        state
            .get(id, "isRefunded")
            .map(|c| c.refunded.contains(contributor))
    }

    async fn escrow_balance(&self, escrow: &EscrowRef) -> LedgerResult<Amount> {
        self.begin(LedgerMethod::EscrowBalance).await?;
        let state = self.state.lock();
        state
            .campaigns
            .iter()
            .find(|c| &c.record.escrow == escrow)
            .map(|c| c.escrow_balance)
            .ok_or_else(|| LedgerError::query("getBalance", format!("unknown escrow {escrow}")))
    }

    async fn submit_contribute(&self, id: CampaignId, amount: Amount) -> LedgerResult<TxReceipt> {
        if self.begin(LedgerMethod::Contribute).await? {
            return Ok(self.reverted());
        }
        let caller = self.state.lock().caller.clone();
        self.apply_contribute(id, caller, amount)
    }

    async fn submit_release_funds(&self, id: CampaignId) -> LedgerResult<TxReceipt> {
        if self.begin(LedgerMethod::ReleaseFunds).await? {
            return Ok(self.reverted());
        }
        self.apply_release(id)
    }

    async fn submit_refund(&self, id: CampaignId) -> LedgerResult<TxReceipt> {
        if self.begin(LedgerMethod::Refund).await? {
            return Ok(self.reverted());
        }
        self.apply_refund(id)
    }

    async fn submit_initiate_refunds(&self, id: CampaignId) -> LedgerResult<TxReceipt> {
        *self.state.lock().initiate_calls.entry(id).or_default() += 1;
        if self.begin(LedgerMethod::InitiateRefunds).await? {
            return Ok(self.reverted());
        }
        self.apply_initiate_refunds(id)
    }

    async fn submit_create_campaign(&self, draft: &CampaignDraft) -> LedgerResult<TxReceipt> {
        if self.begin(LedgerMethod::CreateCampaign).await? {
            return Ok(self.reverted());
        }
        self.apply_create(draft)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }
}
