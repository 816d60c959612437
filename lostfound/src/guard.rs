//! Re-entrancy guard for async operations.
//!
//! Every operation that must not overlap with itself (identity sync, chat
//! list load, poll fetch, message send) claims an [`AtomicBool`] through an
//! [`InFlightGuard`]. The flag is released when the guard drops, which covers
//! success, failure, early return, panic, and cancellation of the owning
//! future alike.

use std::sync::atomic::{AtomicBool, Ordering};

/// Holds an in-flight flag for the lifetime of the guard.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    /// Claim `flag`, or return `None` if it is already claimed.
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
