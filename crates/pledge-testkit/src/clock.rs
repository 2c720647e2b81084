//! Controllable wall clock for deterministic deadline tests.

use pledge_core::{PhysicalClock, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed start time: 2023-11-14 22:13:20 UTC
pub const DEFAULT_START: Timestamp = Timestamp(1_700_000_000);

/// Clock that only moves when told to
#[derive(Clone, Debug)]
pub struct ControllableClock {
    current: Arc<AtomicU64>,
}

impl ControllableClock {
    /// Create a clock reading `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(start.0)),
        }
    }

    /// Advance time by `secs` seconds
    pub fn advance(&self, secs: u64) {
        self.current.fetch_add(secs, Ordering::SeqCst);
    }

    /// Set absolute time
    pub fn set(&self, at: Timestamp) {
        self.current.store(at.0, Ordering::SeqCst);
    }
}

impl Default for ControllableClock {
    fn default() -> Self {
        Self::new(DEFAULT_START)
    }
}

impl PhysicalClock for ControllableClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.current.load(Ordering::SeqCst))
    }
}
