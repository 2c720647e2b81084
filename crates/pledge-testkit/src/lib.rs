//! # Pledge Testkit - Deterministic Ledger Testing
//!
//! Shared test infrastructure for the Pledge crates:
//! - [`MockLedger`]: an in-memory ledger with crowdfunding rules, call
//!   counters, fault injection and gates for overlapping-call scenarios
//! - [`ControllableClock`]: a wall clock that moves only when told to
//! - Fixtures: stable identities and a [`CampaignFixture`] builder
//!
//! ```rust,ignore
//! let ledger = Arc::new(MockLedger::new());
//! let deadline = ledger.clock().now().plus_secs(60);
//! let id = ledger.install(CampaignFixture::new(1_000, deadline).contribution(alice(), 400));
//! ledger.clock().advance(61);
//! ```

pub mod clock;
pub mod fixtures;
pub mod mock_ledger;

pub use clock::{ControllableClock, DEFAULT_START};
pub use fixtures::{alice, bob, carol, creator, identity, CampaignFixture};
pub use mock_ledger::{Fault, LedgerMethod, MockLedger};

/// Install a test subscriber honouring `RUST_LOG`; repeated calls are no-ops.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
