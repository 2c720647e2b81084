//! Immutable, versioned copies of observed campaign state.
//!
//! A snapshot is built once by the reader and then only shared behind an
//! `Arc`. Consistency is per campaign: all fields of one campaign were read
//! together, but different campaigns may reflect slightly different ledger
//! heights.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::campaign::{CampaignRecord, CampaignStatus, Contribution, Escrow};
use crate::types::{Amount, CampaignId, Identity, Timestamp};

/// Everything observed about one campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignState {
    /// Campaign id
    pub id: CampaignId,
    /// Summary fields
    pub record: CampaignRecord,
    /// In first-contribution order
    pub contributions: Vec<Contribution>,
    /// Escrow as observed in the same read
    pub escrow: Escrow,
}

/// A disagreement between observed fields and the documented ledger
/// invariants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// `totalFunds` differs from the sum of non-refunded contributions
    TotalMismatch { reported: Amount, derived: Amount },
    /// `Completed` below goal
    CompletedBelowGoal,
    /// `Failed` before the deadline or with the goal met
    FailedPrematurely,
    /// `fundsReleased` without `Completed`
    ReleasedWithoutCompletion,
    /// Escrow balance differs from what contributions imply
    EscrowMismatch { balance: Amount, expected: Amount },
}

impl CampaignState {
    /// Sum of contributions not yet refunded.
    pub fn outstanding(&self) -> Amount {
        self.contributions.iter().map(Contribution::outstanding).sum()
    }

    /// Contribution record for one contributor.
    pub fn contribution_of(&self, contributor: &Identity) -> Option<&Contribution> {
        self.contributions
            .iter()
            .find(|c| &c.contributor == contributor)
    }

    /// Whether every contributor with a positive amount has been refunded.
    pub fn fully_refunded(&self) -> bool {
        self.contributions
            .iter()
            .filter(|c| !c.amount.is_zero())
            .all(|c| c.refunded)
    }

    /// Check the documented ledger invariants against this observation.
    pub fn invariant_violations(&self, now: Timestamp) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        let record = &self.record;
        let derived = self.outstanding();

        if record.total_funds != derived {
            violations.push(InvariantViolation::TotalMismatch {
                reported: record.total_funds,
                derived,
            });
        }
        if record.status == CampaignStatus::Completed && record.total_funds < record.goal {
            violations.push(InvariantViolation::CompletedBelowGoal);
        }
        if record.status == CampaignStatus::Failed
            && (!record.deadline_passed(now) || record.total_funds >= record.goal)
        {
            violations.push(InvariantViolation::FailedPrematurely);
        }
        if record.funds_released && record.status != CampaignStatus::Completed {
            violations.push(InvariantViolation::ReleasedWithoutCompletion);
        }

        let expected = if record.funds_released {
            Amount::ZERO
        } else {
            derived
        };
        if self.escrow.balance != expected {
            violations.push(InvariantViolation::EscrowMismatch {
                balance: self.escrow.balance,
                expected,
            });
        }
        violations
    }
}

/// A refund flag observed `true` earlier but `false` now.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefundRegression {
    /// Campaign id
    pub campaign: CampaignId,
    /// Who contributed
    pub contributor: Identity,
}

/// Point-in-time copy of all campaign, escrow and contribution state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Strictly increasing per reader; not necessarily dense
    pub version: u64,
    /// Clock reading when the read finished
    pub observed_at: Timestamp,
    campaigns: BTreeMap<CampaignId, CampaignState>,
}

impl Snapshot {
    /// Assemble a snapshot from per-campaign observations.
    pub fn new(
        version: u64,
        observed_at: Timestamp,
        campaigns: impl IntoIterator<Item = CampaignState>,
    ) -> Self {
        Self {
            version,
            observed_at,
            campaigns: campaigns.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    /// Number of campaigns observed.
    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    /// Whether no campaigns were observed.
    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }

    /// Look up one campaign.
    pub fn campaign(&self, id: CampaignId) -> Option<&CampaignState> {
        self.campaigns.get(&id)
    }

    /// All campaigns in id order.
    pub fn campaigns(&self) -> impl Iterator<Item = &CampaignState> {
        self.campaigns.values()
    }

    /// Campaigns still accepting contributions.
    pub fn active_campaigns(&self) -> impl Iterator<Item = &CampaignState> {
        self.campaigns
            .values()
            .filter(|c| c.record.status == CampaignStatus::Active)
    }

    /// Per-campaign amounts contributed by one identity, omitting zeros.
    pub fn contributions_of(&self, contributor: &Identity) -> BTreeMap<CampaignId, Amount> {
        self.campaigns
            .values()
            .filter_map(|state| {
                state
                    .contribution_of(contributor)
                    .filter(|c| !c.amount.is_zero())
                    .map(|c| (state.id, c.amount))
            })
            .collect()
    }

    /// Refund flags that were `true` in `previous` and are `false` here.
    ///
    /// Contributors missing from this snapshot do not count: absence is not
    /// an observation of `false`.
    pub fn refund_regressions(&self, previous: &Snapshot) -> Vec<RefundRegression> {
        let mut regressions = BTreeSet::new();
        for before in previous.campaigns() {
            let Some(after) = self.campaign(before.id) else {
                continue;
            };
            for contribution in before.contributions.iter().filter(|c| c.refunded) {
                if let Some(now) = after.contribution_of(&contribution.contributor) {
                    if !now.refunded {
                        regressions.insert(RefundRegression {
                            campaign: before.id,
                            contributor: contribution.contributor.clone(),
                        });
                    }
                }
            }
        }
        regressions.into_iter().collect()
    }

    /// Set `refunded` back to `true` for each regressed pair.
    ///
    /// Returns how many flags were restored.
    pub fn restore_refund_flags(&mut self, regressions: &[RefundRegression]) -> usize {
        let mut restored = 0;
        for regression in regressions {
            let Some(state) = self.campaigns.get_mut(&regression.campaign) else {
                continue;
            };
            for contribution in state
                .contributions
                .iter_mut()
                .filter(|c| c.contributor == regression.contributor && !c.refunded)
            {
                contribution.refunded = true;
                restored += 1;
            }
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EscrowRef;

    fn state(id: u64, contributions: &[(&str, u128, bool)]) -> CampaignState {
        let contributions: Vec<Contribution> = contributions
            .iter()
            .map(|(who, amount, refunded)| Contribution {
                contributor: Identity::new(who),
                amount: Amount(*amount),
                refunded: *refunded,
            })
            .collect();
        let outstanding: Amount = contributions.iter().map(Contribution::outstanding).sum();
        CampaignState {
            id: CampaignId(id),
            record: CampaignRecord {
                creator: Identity::new("0xc0ffee"),
                title: format!("campaign {id}"),
                description: String::new(),
                goal: Amount(1000),
                deadline: Timestamp(50),
                total_funds: outstanding,
                status: CampaignStatus::Active,
                funds_released: false,
                media_refs: Vec::new(),
                escrow: EscrowRef(format!("escrow-{id}")),
            },
            contributions,
            escrow: Escrow {
                reference: EscrowRef(format!("escrow-{id}")),
                balance: outstanding,
            },
        }
    }

    #[test]
    fn consistent_state_has_no_violations() {
        let campaign = state(0, &[("0xa", 300, false), ("0xb", 200, false)]);
        assert_eq!(campaign.outstanding(), Amount(500));
        assert!(campaign.invariant_violations(Timestamp(10)).is_empty());
    }

    #[test]
    fn total_mismatch_is_reported() {
        let mut campaign = state(0, &[("0xa", 300, false)]);
        campaign.record.total_funds = Amount(400);
        assert!(campaign
            .invariant_violations(Timestamp(10))
            .contains(&InvariantViolation::TotalMismatch {
                reported: Amount(400),
                derived: Amount(300),
            }));
    }

    #[test]
    fn premature_failure_is_reported() {
        let mut campaign = state(0, &[("0xa", 300, false)]);
        campaign.record.status = CampaignStatus::Failed;
        assert_eq!(
            campaign.invariant_violations(Timestamp(10)),
            vec![InvariantViolation::FailedPrematurely]
        );
        assert!(campaign.invariant_violations(Timestamp(51)).is_empty());
    }

    #[test]
    fn contributions_of_skips_zero_and_absent() {
        let snapshot = Snapshot::new(
            1,
            Timestamp(10),
            [
                state(0, &[("0xa", 300, false)]),
                state(1, &[("0xb", 100, false)]),
                state(2, &[("0xa", 0, false)]),
            ],
        );
        let mine = snapshot.contributions_of(&Identity::new("0xA"));
        assert_eq!(mine.len(), 1);
        assert_eq!(mine.get(&CampaignId(0)), Some(&Amount(300)));
    }

    #[test]
    fn regressions_are_detected() {
        let before = Snapshot::new(1, Timestamp(10), [state(0, &[("0xa", 300, true)])]);
        let stale = Snapshot::new(2, Timestamp(11), [state(0, &[("0xa", 300, false)])]);
        let fresh = Snapshot::new(3, Timestamp(12), [state(0, &[("0xa", 300, true)])]);

        assert_eq!(
            stale.refund_regressions(&before),
            vec![RefundRegression {
                campaign: CampaignId(0),
                contributor: Identity::new("0xa"),
            }]
        );
        assert!(fresh.refund_regressions(&before).is_empty());
    }

    #[test]
    fn restored_flags_match_previous_observation() {
        let before = Snapshot::new(1, Timestamp(10), [state(0, &[("0xa", 300, true)])]);
        let mut stale = Snapshot::new(
            2,
            Timestamp(11),
            [
                state(0, &[("0xa", 300, false), ("0xb", 50, false)]),
                state(1, &[("0xa", 10, false)]),
            ],
        );

        let regressions = stale.refund_regressions(&before);
        assert_eq!(stale.restore_refund_flags(&regressions), 1);

        let campaign = stale.campaign(CampaignId(0)).unwrap();
        assert!(campaign.contributions[0].refunded);
        assert!(!campaign.contributions[1].refunded);
        assert!(!stale.campaign(CampaignId(1)).unwrap().contributions[0].refunded);
        assert!(stale.refund_regressions(&before).is_empty());
    }

    #[test]
    fn active_campaigns_filters_status() {
        let mut done = state(1, &[]);
        done.record.status = CampaignStatus::Completed;
        let snapshot = Snapshot::new(1, Timestamp(10), [state(0, &[]), done]);
        let ids: Vec<_> = snapshot.active_campaigns().map(|c| c.id).collect();
        assert_eq!(ids, vec![CampaignId(0)]);
    }
}
