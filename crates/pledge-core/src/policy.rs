//! Refund eligibility and action availability rules.
//!
//! Eligibility deliberately does not require `status = Failed`: the ledger's
//! status transition and refund initiation are separate operations that need
//! not land together, so "past deadline, underfunded, not yet refunded" is the
//! actionable condition on its own.

use serde::{Deserialize, Serialize};

use crate::campaign::{CampaignRecord, CampaignStatus};
use crate::snapshot::CampaignState;
use crate::types::{Amount, Identity, Timestamp};

/// Summary-level refund predicate:
/// `deadline < now ∧ totalFunds > 0 ∧ totalFunds < goal ∧ status ≠ Refunded`.
pub fn is_refund_eligible(record: &CampaignRecord, now: Timestamp) -> bool {
    record.deadline_passed(now)
        && !record.total_funds.is_zero()
        && record.total_funds < record.goal
        && record.status != CampaignStatus::Refunded
}

/// Detailed refund classification of one observed campaign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundEligibility {
    /// Refund initiation should be submitted
    Eligible { outstanding: Amount },
    /// Deadline has not passed yet
    NotYetDue,
    /// Goal met; funds go to the creator instead
    GoalMet,
    /// Nothing was ever contributed
    NoFunds,
    /// Ledger already recorded `Refunded`
    AlreadyRefunded,
    /// Summary says underfunded, but every observed contribution is refunded
    NothingOutstanding,
}

impl RefundEligibility {
    /// Whether a refund initiation should be submitted.
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible { .. })
    }
}

/// Classify a campaign for refund orchestration.
///
/// The summary predicate must hold, and the ledger's own per-contributor
/// `refunded` flags must still show a positive outstanding balance. The flags
/// are the authoritative dedup signal; they survive process restarts where
/// session memory does not.
pub fn evaluate_refund(state: &CampaignState, now: Timestamp) -> RefundEligibility {
    let record = &state.record;
    if record.status == CampaignStatus::Refunded {
        return RefundEligibility::AlreadyRefunded;
    }
    if !record.deadline_passed(now) {
        return RefundEligibility::NotYetDue;
    }
    if record.total_funds.is_zero() {
        return RefundEligibility::NoFunds;
    }
    if record.total_funds >= record.goal {
        return RefundEligibility::GoalMet;
    }
    let outstanding = state.outstanding();
    if !state.contributions.is_empty() && outstanding.is_zero() {
        return RefundEligibility::NothingOutstanding;
    }
    debug_assert!(is_refund_eligible(record, now));
    RefundEligibility::Eligible {
        outstanding: if state.contributions.is_empty() {
            record.total_funds
        } else {
            outstanding
        },
    }
}

/// Which user actions the view layer may enable for one viewer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAvailability {
    /// Campaign is active and its deadline has not passed
    pub can_contribute: bool,
    /// Viewer is the creator of a completed, unreleased campaign
    pub can_release: bool,
    /// Campaign failed and the viewer still has funds in it
    pub can_refund: bool,
}

impl ActionAvailability {
    /// Derive availability from an observed campaign.
    pub fn for_viewer(state: &CampaignState, viewer: Option<&Identity>, now: Timestamp) -> Self {
        let record = &state.record;
        let can_contribute =
            record.status == CampaignStatus::Active && !record.deadline_passed(now);
        let can_release = record.status == CampaignStatus::Completed
            && !record.funds_released
            && viewer == Some(&record.creator);
        let can_refund = record.status == CampaignStatus::Failed
            && viewer
                .and_then(|who| state.contribution_of(who))
                .is_some_and(|c| !c.outstanding().is_zero());

        Self {
            can_contribute,
            can_release,
            can_refund,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{Contribution, Escrow};
    use crate::types::{CampaignId, EscrowRef};

    const DEADLINE: Timestamp = Timestamp(1_000);

    fn campaign(goal: u128, contributions: &[(&str, u128, bool)]) -> CampaignState {
        let contributions: Vec<Contribution> = contributions
            .iter()
            .map(|(who, amount, refunded)| Contribution {
                contributor: Identity::new(who),
                amount: Amount(*amount),
                refunded: *refunded,
            })
            .collect();
        let total: Amount = contributions.iter().map(Contribution::outstanding).sum();
        CampaignState {
            id: CampaignId(0),
            record: CampaignRecord {
                creator: Identity::new("0xCREATOR"),
                title: "Library".to_string(),
                description: "Books".to_string(),
                goal: Amount(goal),
                deadline: DEADLINE,
                total_funds: total,
                status: CampaignStatus::Active,
                funds_released: false,
                media_refs: Vec::new(),
                escrow: EscrowRef("escrow-0".to_string()),
            },
            contributions,
            escrow: Escrow {
                reference: EscrowRef("escrow-0".to_string()),
                balance: total,
            },
        }
    }

    #[test]
    fn underfunded_after_deadline_is_eligible() {
        let state = campaign(1000, &[("0xa", 400, false), ("0xb", 200, false)]);
        let after = DEADLINE.plus_secs(1);
        assert!(is_refund_eligible(&state.record, after));
        assert_eq!(
            evaluate_refund(&state, after),
            RefundEligibility::Eligible {
                outstanding: Amount(600)
            }
        );
    }

    #[test]
    fn funded_campaign_is_not_eligible() {
        let state = campaign(1000, &[("0xa", 600, false), ("0xb", 400, false)]);
        let after = DEADLINE.plus_secs(1);
        assert!(!is_refund_eligible(&state.record, after));
        assert_eq!(evaluate_refund(&state, after), RefundEligibility::GoalMet);
    }

    #[test]
    fn deadline_instant_is_not_yet_due() {
        let state = campaign(1000, &[("0xa", 100, false)]);
        assert_eq!(evaluate_refund(&state, DEADLINE), RefundEligibility::NotYetDue);
    }

    #[test]
    fn refunded_status_is_terminal() {
        let mut state = campaign(1000, &[("0xa", 100, false)]);
        state.record.status = CampaignStatus::Refunded;
        assert_eq!(
            evaluate_refund(&state, DEADLINE.plus_secs(5)),
            RefundEligibility::AlreadyRefunded
        );
    }

    #[test]
    fn ledger_refund_flags_suppress_eligibility() {
        let mut state = campaign(1000, &[("0xa", 100, true)]);
        // Summary not yet updated while flags already are.
        state.record.total_funds = Amount(100);
        assert_eq!(
            evaluate_refund(&state, DEADLINE.plus_secs(5)),
            RefundEligibility::NothingOutstanding
        );
    }

    #[test]
    fn release_requires_creator() {
        let mut state = campaign(100, &[("0xa", 100, false)]);
        state.record.status = CampaignStatus::Completed;
        let now = DEADLINE.plus_secs(1);

        let creator = Identity::new("0xcreator");
        let stranger = Identity::new("0xa");
        assert!(ActionAvailability::for_viewer(&state, Some(&creator), now).can_release);
        assert!(!ActionAvailability::for_viewer(&state, Some(&stranger), now).can_release);
        assert!(!ActionAvailability::for_viewer(&state, None, now).can_release);

        state.record.funds_released = true;
        assert!(!ActionAvailability::for_viewer(&state, Some(&creator), now).can_release);
    }

    #[test]
    fn refund_requires_own_outstanding_contribution() {
        let mut state = campaign(1000, &[("0xa", 100, false), ("0xb", 50, true)]);
        state.record.status = CampaignStatus::Failed;
        let now = DEADLINE.plus_secs(1);

        let a = ActionAvailability::for_viewer(&state, Some(&Identity::new("0xa")), now);
        let b = ActionAvailability::for_viewer(&state, Some(&Identity::new("0xb")), now);
        assert!(a.can_refund);
        assert!(!b.can_refund);
        assert!(!a.can_contribute);
    }

    #[test]
    fn contribute_closes_at_deadline() {
        let state = campaign(1000, &[]);
        assert!(ActionAvailability::for_viewer(&state, None, DEADLINE).can_contribute);
        assert!(!ActionAvailability::for_viewer(&state, None, DEADLINE.plus_secs(1)).can_contribute);
    }
}
