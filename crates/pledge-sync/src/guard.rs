//! Check-then-set busy flags with scoped release.
//!
//! Every mutual-exclusion point in the engine (refresh in flight, scan in
//! flight, per-slot submissions) is a single compare-and-swap on an
//! `AtomicBool`. Acquiring hands back an [`InFlightGuard`]; dropping it clears
//! the flag, so early returns, `?` and unwinding all release.

use std::sync::atomic::{AtomicBool, Ordering};

/// Non-blocking busy flag
#[derive(Debug, Default)]
pub struct InFlight {
    busy: AtomicBool,
}

impl InFlight {
    /// Create an idle flag
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Mark busy if idle; `None` if someone already holds it.
    pub fn try_acquire(&self) -> Option<InFlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { flag: self })
    }

    /// Whether a holder currently exists
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds an [`InFlight`] busy until dropped
#[must_use = "the flag is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    flag: &'a InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::Release);
    }
}
