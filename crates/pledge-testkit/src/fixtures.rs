//! Identities and campaign fixtures.

use pledge_core::{Amount, CampaignStatus, Identity, MediaRef, Timestamp};

/// Deterministic address for test account `n`
pub fn identity(n: u8) -> Identity {
    Identity::new(format!("0x{:040x}", u32::from(n) + 0xa000))
}

/// Campaign creator used by default fixtures
pub fn creator() -> Identity {
    identity(0)
}

/// First contributor
pub fn alice() -> Identity {
    identity(1)
}

/// Second contributor
pub fn bob() -> Identity {
    identity(2)
}

/// Third contributor
pub fn carol() -> Identity {
    identity(3)
}

/// Campaign installed directly into a mock ledger, bypassing ledger rules.
///
/// Lets tests start from states that would otherwise need wall time to pass,
/// such as contributions that landed before a deadline already in the past.
#[derive(Clone, Debug)]
pub struct CampaignFixture {
    pub creator: Identity,
    pub title: String,
    pub description: String,
    pub goal: Amount,
    /// Last instant contributions are accepted
    pub deadline: Timestamp,
    /// Lifecycle status
    pub status: CampaignStatus,
    pub funds_released: bool,
    pub media_refs: Vec<MediaRef>,
    /// `(contributor, amount, refunded)`; repeated contributors accumulate
    pub contributions: Vec<(Identity, Amount, bool)>,
}

impl CampaignFixture {
    /// Active campaign owned by [`creator`] with no contributions
    pub fn new(goal: u128, deadline: Timestamp) -> Self {
        Self {
            creator: creator(),
            title: "Community garden".to_string(),
            description: "Raised beds and a tool shed".to_string(),
            goal: Amount(goal),
            deadline,
            status: CampaignStatus::Active,
            funds_released: false,
            media_refs: Vec::new(),
            contributions: Vec::new(),
        }
    }

    /// Set the creator
    pub fn creator(mut self, creator: Identity) -> Self {
        self.creator = creator;
        self
    }

    /// Set the title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Install with this status instead of `Active`
    pub fn status(mut self, status: CampaignStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark funds as already released
    pub fn released(mut self) -> Self {
        self.funds_released = true;
        self
    }

    /// Attach a media reference
    pub fn media(mut self, cid: impl Into<String>) -> Self {
        self.media_refs.push(MediaRef(cid.into()));
        self
    }

    /// Add a contribution that has not been refunded
    pub fn contribution(mut self, contributor: Identity, amount: u128) -> Self {
        self.contributions.push((contributor, Amount(amount), false));
        self
    }

    /// Add a contribution already refunded
    pub fn refunded_contribution(mut self, contributor: Identity, amount: u128) -> Self {
        self.contributions.push((contributor, Amount(amount), true));
        self
    }
}
