//! Campaign, escrow and contribution records.
//!
//! These mirror what the ledger reports. Status transitions are decided and
//! recorded by the ledger; this crate only observes them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Amount, EscrowRef, Identity, MediaRef, Timestamp};

/// Lifecycle status of a campaign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CampaignStatus {
    /// Accepting contributions until the deadline
    Active,
    /// Deadline passed with the goal met
    Completed,
    /// Deadline passed with the goal unmet
    Failed,
    /// Every contribution has been returned (terminal)
    Refunded,
}

impl CampaignStatus {
    /// Decode the ledger's numeric status encoding.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Active),
            1 => Some(Self::Completed),
            2 => Some(Self::Failed),
            3 => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Numeric encoding used by the ledger.
    pub fn code(&self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Completed => 1,
            Self::Failed => 2,
            Self::Refunded => 3,
        }
    }

    /// `Refunded` accepts no further contributions, releases or refunds.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Refunded)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Refunded => write!(f, "Refunded"),
        }
    }
}

/// Campaign summary fields as returned by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRecord {
    /// Only identity allowed to release funds
    pub creator: Identity,
    /// Display title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Target the campaign must reach by its deadline
    pub goal: Amount,
    /// Last instant contributions are accepted
    pub deadline: Timestamp,
    /// Sum of all non-refunded contributions
    pub total_funds: Amount,
    /// Lifecycle status
    pub status: CampaignStatus,
    /// Set once by a successful release
    pub funds_released: bool,
    /// Opaque content identifiers for attached media
    pub media_refs: Vec<MediaRef>,
    /// Escrow holding this campaign's funds
    pub escrow: EscrowRef,
}

impl CampaignRecord {
    /// Whether the deadline is strictly in the past at `now`.
    pub fn deadline_passed(&self, now: Timestamp) -> bool {
        self.deadline < now
    }

    /// Funding progress in basis points, capped at 100%.
    pub fn progress_bps(&self) -> u32 {
        if self.goal.is_zero() {
            return 10_000;
        }
        let bps = self.total_funds.0.saturating_mul(10_000) / self.goal.0;
        bps.min(10_000) as u32
    }
}

/// Accumulated contribution of one contributor to one campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// Who contributed
    pub contributor: Identity,
    /// Total contributed, unchanged by a refund
    pub amount: Amount,
    /// Once `true` this never returns to `false`
    pub refunded: bool,
}

impl Contribution {
    /// Amount still held for this contributor.
    pub fn outstanding(&self) -> Amount {
        if self.refunded {
            Amount::ZERO
        } else {
            self.amount
        }
    }
}

/// Fund-holding entity paired 1:1 with a campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    /// Ledger reference of the escrow
    pub reference: EscrowRef,
    /// Funds currently held
    pub balance: Amount,
}

/// Parameters for creating a new campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignDraft {
    /// Display title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Target the campaign must reach by its deadline
    pub goal: Amount,
    /// Campaign length from creation, in seconds
    pub duration_secs: u64,
    /// Opaque content identifiers for attached media
    pub media_refs: Vec<MediaRef>,
}

impl CampaignDraft {
    /// Reasons this draft would be refused, empty when it is well-formed.
    pub fn problems(&self) -> Vec<&'static str> {
        let mut problems = Vec::new();
        if self.title.trim().is_empty() {
            problems.push("title must not be empty");
        }
        if self.description.trim().is_empty() {
            problems.push("description must not be empty");
        }
        if self.goal.is_zero() {
            problems.push("goal must be positive");
        }
        if self.duration_secs == 0 {
            problems.push("duration must be positive");
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(goal: u128, total: u128) -> CampaignRecord {
        CampaignRecord {
            creator: Identity::new("0xc0ffee"),
            title: "Solar roof".to_string(),
            description: "Panels for the community hall".to_string(),
            goal: Amount(goal),
            deadline: Timestamp(100),
            total_funds: Amount(total),
            status: CampaignStatus::Active,
            funds_released: false,
            media_refs: Vec::new(),
            escrow: EscrowRef("escrow-0".to_string()),
        }
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [
            CampaignStatus::Active,
            CampaignStatus::Completed,
            CampaignStatus::Failed,
            CampaignStatus::Refunded,
        ] {
            assert_eq!(CampaignStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(CampaignStatus::from_code(4), None);
    }

    #[test]
    fn progress_is_capped() {
        assert_eq!(record(1000, 600).progress_bps(), 6_000);
        assert_eq!(record(1000, 2500).progress_bps(), 10_000);
        assert_eq!(record(0, 0).progress_bps(), 10_000);
    }

    #[test]
    fn deadline_is_exclusive() {
        let campaign = record(1000, 0);
        assert!(!campaign.deadline_passed(Timestamp(100)));
        assert!(campaign.deadline_passed(Timestamp(101)));
    }

    #[test]
    fn draft_problems_are_reported() {
        let draft = CampaignDraft {
            title: "  ".to_string(),
            description: "desc".to_string(),
            goal: Amount::ZERO,
            duration_secs: 0,
            media_refs: Vec::new(),
        };
        assert_eq!(
            draft.problems(),
            vec![
                "title must not be empty",
                "goal must be positive",
                "duration must be positive"
            ]
        );
    }
}
