//! Monotonic clock abstraction for time-based policy decisions.
//!
//! Both policies read time as nanoseconds since the clock's own epoch: the
//! breaker compares against its open timer, the rate limiter derives the
//! active cycle. Tests substitute [`ManualClock`] to drive transitions
//! deterministically.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::Instant;

/// Source of monotonic time for a policy instance.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Nanoseconds elapsed since this clock's epoch.
    fn now_nanos(&self) -> u64;
}

/// System clock measuring from its construction instant.
#[derive(Debug)]
pub struct RealClock {
    epoch: Instant,
}

impl RealClock {
    /// Creates a clock whose epoch is the current instant.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RealClock {
    fn now_nanos(&self) -> u64 {
        // Saturate on the theoretical u128 > u64 overflow (~584 years).
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Hand-driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock at nanosecond 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `nanos`.
    pub fn advance(&self, nanos: u64) {
        self.now.fetch_add(nanos, Relaxed);
    }

    /// Sets the clock to an absolute nanosecond value.
    pub fn set(&self, nanos: u64) {
        self.now.store(nanos, Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> u64 {
        self.now.load(Relaxed)
    }
}
