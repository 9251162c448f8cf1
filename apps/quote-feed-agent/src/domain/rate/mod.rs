//! Message Rate Counting
//!
//! Counts inbound feed messages per sampling interval. Increments come from
//! the feed client's execution context while samples are taken by the
//! metrics ticker, so the count lives in an atomic.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counter of feed messages observed since the last sample.
#[derive(Debug, Default)]
pub struct RateCounter {
    count: AtomicU64,
}

impl RateCounter {
    /// Create a counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// Record one inbound message.
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `n` inbound messages.
    pub fn add(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Read the current count and reset it to zero in one atomic step.
    ///
    /// Returns the pre-reset value.
    pub fn sample(&self) -> u64 {
        self.count.swap(0, Ordering::AcqRel)
    }

    /// Read the current count without resetting it.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
