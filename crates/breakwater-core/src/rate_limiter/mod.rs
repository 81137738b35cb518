//! Lock-free, cycle-based rate limiter.
//!
//! Monotonic time since the limiter's start is partitioned into cycles of
//! `limit_refresh_period`; each cycle grants `limit_for_period` permits.
//! The whole mutable state is one immutable triple behind an atomic
//! reference, replaced wholesale by compare-and-swap, so the permit
//! decision itself never takes a lock. Callers that overdraw the current
//! cycle reserve a slot in a future one (the permit count goes negative)
//! and park until that cycle starts.
//!
//! ```
//! use std::time::Duration;
//! use breakwater_core::rate_limiter::{AtomicRateLimiter, LimiterConfig};
//!
//! let limiter = AtomicRateLimiter::new(
//!     "ingest",
//!     LimiterConfig::builder()
//!         .limit_for_period(100)
//!         .limit_refresh_period(Duration::from_secs(1))
//!         .timeout_duration(Duration::from_millis(25))
//!         .build()?,
//! )?;
//!
//! if limiter.acquire().is_ok() {
//!     // admitted within the timeout
//! }
//! # Ok::<(), breakwater_core::ConfigError>(())
//! ```

mod config;
mod event;

pub use config::{LimiterConfig, LimiterConfigBuilder};
pub use event::LimiterEvent;

use std::sync::atomic::{
    AtomicU32, AtomicU64,
    Ordering::Relaxed,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use breakwater_events::{CircularEventConsumer, EventBus, EventStream};
use tracing::debug;

use crate::clock::{Clock, RealClock};
use crate::error::{ConfigError, RequestNotPermittedError};

/// The limiter's entire mutable state: an immutable value replaced
/// wholesale on every successful acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterState {
    /// Index of the cycle this state was computed in.
    pub active_cycle: u64,
    /// Permits remaining in the active cycle. Negative values are
    /// reservations: each unit below zero is one caller already scheduled
    /// to be admitted in a future cycle.
    pub active_permissions: i64,
    /// Wait imposed on the most recent acquisition decision, in
    /// nanoseconds.
    pub nanos_to_wait: u64,
}

/// Point-in-time view of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterMetrics {
    /// Permits available right now (negative while future cycles are
    /// already reserved), accounting for cycle rollover.
    pub available_permissions: i64,
    /// Callers currently parked waiting for their reserved cycle.
    pub waiting_threads: u32,
    /// Wait imposed on the most recent acquisition decision, in
    /// nanoseconds.
    pub nanos_to_wait: u64,
}

#[derive(Debug)]
struct Inner {
    name: Arc<str>,
    refresh_period_nanos: u64,
    limit_for_period: AtomicU32,
    timeout_nanos: AtomicU64,
    state: ArcSwap<LimiterState>,
    waiting_threads: AtomicU32,
    clock: Arc<dyn Clock>,
    bus: EventBus<LimiterEvent>,
}

/// A named rate limiter instance.
///
/// Cheap to clone; all clones share the same state and event bus.
#[derive(Debug, Clone)]
pub struct AtomicRateLimiter {
    inner: Arc<Inner>,
}

impl AtomicRateLimiter {
    /// Creates a limiter with the given name and configuration.
    ///
    /// Fails fast with [`ConfigError`] on invalid configuration values.
    pub fn new(name: impl Into<String>, config: LimiterConfig) -> Result<Self, ConfigError> {
        Self::with_clock(name, config, Arc::new(RealClock::new()))
    }

    /// Creates a limiter driven by the supplied clock. The clock's epoch is
    /// the limiter's epoch. Useful for tests.
    pub fn with_clock(
        name: impl Into<String>,
        config: LimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new_validated(name.into(), config, clock))
    }

    pub(crate) fn new_validated(name: String, config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let refresh = duration_to_nanos(config.limit_refresh_period).max(1);
        Self {
            inner: Arc::new(Inner {
                name: Arc::from(name.as_str()),
                refresh_period_nanos: refresh,
                limit_for_period: AtomicU32::new(config.limit_for_period),
                timeout_nanos: AtomicU64::new(duration_to_nanos(config.timeout_duration)),
                state: ArcSwap::from_pointee(LimiterState {
                    active_cycle: 0,
                    active_permissions: i64::from(config.limit_for_period),
                    nanos_to_wait: 0,
                }),
                waiting_threads: AtomicU32::new(0),
                clock,
                bus: EventBus::new(),
            }),
        }
    }

    /// Acquires a permit within the configured default timeout.
    pub fn acquire(&self) -> Result<(), RequestNotPermittedError> {
        let timeout = self.inner.timeout_nanos.load(Relaxed);
        self.acquire_nanos(timeout)
    }

    /// Acquires a permit, waiting at most `timeout`.
    ///
    /// Returns immediately when the active cycle still has permits. When it
    /// does not, the caller reserves a slot in the next cycle with room and
    /// parks until that cycle starts. If the required wait exceeds
    /// `timeout`, the call instead fails fast without consuming a future
    /// slot.
    pub fn acquire_permission(&self, timeout: Duration) -> Result<(), RequestNotPermittedError> {
        self.acquire_nanos(duration_to_nanos(timeout))
    }

    fn acquire_nanos(&self, timeout_nanos: u64) -> Result<(), RequestNotPermittedError> {
        let inner = &*self.inner;
        let mut admitted = false;
        let mut wait_nanos = 0u64;

        // CAS loop: recompute against the freshest state and clock reading
        // on every contention retry.
        inner.state.rcu(|current| {
            let now = inner.clock.now_nanos();
            let limit = i64::from(inner.limit_for_period.load(Relaxed));
            let (next, ok) = next_state(
                current,
                now,
                inner.refresh_period_nanos,
                limit,
                timeout_nanos,
            );
            admitted = ok;
            wait_nanos = next.nanos_to_wait;
            Arc::new(next)
        });

        if !admitted {
            debug!(
                limiter = %inner.name,
                wait_nanos,
                timeout_nanos,
                "permit rejected, required wait exceeds timeout"
            );
            inner.bus.emit(LimiterEvent::rejected(&inner.name));
            return Err(RequestNotPermittedError {
                name: inner.name.to_string(),
            });
        }

        if wait_nanos > 0 {
            self.park(wait_nanos);
        }
        debug!(limiter = %inner.name, wait_nanos, "permit acquired");
        inner.bus.emit(LimiterEvent::permitted(&inner.name));
        Ok(())
    }

    /// Parks the calling thread for the reserved wait, riding out spurious
    /// and stray wakeups.
    fn park(&self, wait_nanos: u64) {
        self.inner.waiting_threads.fetch_add(1, Relaxed);
        let deadline = Instant::now() + Duration::from_nanos(wait_nanos);
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
        self.inner.waiting_threads.fetch_sub(1, Relaxed);
    }

    /// Replaces the per-cycle permit budget. Takes effect from the next
    /// acquisition; outstanding reservations stay valid.
    pub fn change_limit_for_period(&self, limit: u32) -> Result<(), ConfigError> {
        if limit < 1 {
            return Err(ConfigError::new("limit_for_period must be at least 1"));
        }
        self.inner.limit_for_period.store(limit, Relaxed);
        Ok(())
    }

    /// Replaces the default timeout used by [`acquire`](Self::acquire).
    pub fn change_timeout_duration(&self, timeout: Duration) {
        self.inner
            .timeout_nanos
            .store(duration_to_nanos(timeout), Relaxed);
    }

    /// Name of this instance.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Permits granted per cycle.
    pub fn limit_for_period(&self) -> u32 {
        self.inner.limit_for_period.load(Relaxed)
    }

    /// Length of one permit cycle.
    pub fn limit_refresh_period(&self) -> Duration {
        Duration::from_nanos(self.inner.refresh_period_nanos)
    }

    /// Default wait budget of [`acquire`](Self::acquire).
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_nanos(self.inner.timeout_nanos.load(Relaxed))
    }

    /// The most recently published state triple.
    pub fn current_state(&self) -> LimiterState {
        *self.inner.state.load_full()
    }

    /// Point-in-time metrics, with permits projected through cycle
    /// rollover.
    pub fn metrics(&self) -> LimiterMetrics {
        let state = self.current_state();
        let now = self.inner.clock.now_nanos();
        let current_cycle = now / self.inner.refresh_period_nanos;
        let available_permissions = if current_cycle > state.active_cycle {
            i64::from(self.inner.limit_for_period.load(Relaxed))
        } else {
            state.active_permissions
        };
        LimiterMetrics {
            available_permissions,
            waiting_threads: self.inner.waiting_threads.load(Relaxed),
            nanos_to_wait: state.nanos_to_wait,
        }
    }

    /// Subscribes to this limiter's event stream from this point onward.
    pub fn subscribe(&self) -> EventStream<LimiterEvent> {
        self.inner.bus.subscribe()
    }

    /// Returns a bounded consumer retaining the last `capacity` events.
    pub fn consume_last(&self, capacity: usize) -> CircularEventConsumer<LimiterEvent> {
        CircularEventConsumer::new(self.inner.bus.subscribe(), capacity)
    }
}

/// Computes the state to publish for one acquisition attempt.
///
/// Entering a later cycle restores the permit budget; leftover negative
/// reservations are discarded because their owners were already scheduled
/// to wake in the cycle they reserved. The returned flag says whether the
/// caller is admitted (its wait fits the timeout); a rejected caller's
/// state keeps the rolled cycle and undecremented permits.
fn next_state(
    current: &LimiterState,
    now: u64,
    refresh_nanos: u64,
    limit: i64,
    timeout_nanos: u64,
) -> (LimiterState, bool) {
    let current_cycle = now / refresh_nanos;
    let permissions = if current_cycle > current.active_cycle {
        limit
    } else {
        current.active_permissions
    };

    let nanos_to_wait = if permissions > 0 {
        0
    } else {
        // This caller would be reservation number (1 - permissions) in
        // line; ceil against the budget gives the cycle its slot opens in.
        let place_in_line = (1 - permissions) as u64;
        let cycles_to_wait = place_in_line.div_ceil(limit as u64);
        (cycles_to_wait - 1)
            .saturating_mul(refresh_nanos)
            .saturating_add(refresh_nanos - now % refresh_nanos)
    };

    let admitted = nanos_to_wait <= timeout_nanos;
    (
        LimiterState {
            active_cycle: current_cycle,
            active_permissions: if admitted {
                permissions - 1
            } else {
                permissions
            },
            nanos_to_wait,
        },
        admitted,
    )
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const SECOND: u64 = 1_000_000_000;

    fn limiter(limit: u32, refresh: Duration, timeout: Duration) -> (AtomicRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = AtomicRateLimiter::with_clock(
            "test",
            LimiterConfig::builder()
                .limit_for_period(limit)
                .limit_refresh_period(refresh)
                .timeout_duration(timeout)
                .build()
                .unwrap(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();
        (limiter, clock)
    }

    #[test]
    fn second_call_in_cycle_is_rejected_with_zero_timeout() {
        let (limiter, clock) = limiter(1, Duration::from_secs(1), Duration::ZERO);

        assert!(limiter.acquire().is_ok());
        assert!(limiter.acquire().is_err());

        clock.advance(SECOND);
        assert!(limiter.acquire().is_ok());
    }

    #[test]
    fn rejection_does_not_consume_a_slot() {
        let (limiter, clock) = limiter(1, Duration::from_secs(1), Duration::ZERO);

        assert!(limiter.acquire().is_ok());
        for _ in 0..5 {
            assert!(limiter.acquire().is_err());
        }
        // The rejections reserved nothing: the next cycle's single permit
        // is granted immediately.
        clock.advance(SECOND);
        assert!(limiter.acquire().is_ok());
        assert!(limiter.acquire().is_err());
    }

    #[test]
    fn cycle_rollover_discards_leftover_reservations() {
        let state = LimiterState {
            active_cycle: 3,
            active_permissions: -7,
            nanos_to_wait: 0,
        };
        // Two cycles later the budget is simply restored.
        let (next, admitted) = next_state(&state, 5 * SECOND + 1, SECOND, 4, 0);
        assert!(admitted);
        assert_eq!(next.active_cycle, 5);
        assert_eq!(next.active_permissions, 3);
        assert_eq!(next.nanos_to_wait, 0);
    }

    #[test]
    fn reservation_waits_step_by_whole_cycles() {
        // limit 1, refresh 1s, t = 0: successive acquisitions at the same
        // instant wait 0s, 1s, 2s, ...
        let mut state = LimiterState {
            active_cycle: 0,
            active_permissions: 1,
            nanos_to_wait: 0,
        };
        let expected_waits = [0, SECOND, 2 * SECOND, 3 * SECOND];
        for &expected in &expected_waits {
            let (next, admitted) = next_state(&state, 0, SECOND, 1, u64::MAX);
            assert!(admitted);
            assert_eq!(next.nanos_to_wait, expected);
            state = next;
        }
        assert_eq!(state.active_permissions, -3);
    }

    #[test]
    fn wait_accounts_for_position_within_the_cycle() {
        let state = LimiterState {
            active_cycle: 0,
            active_permissions: 0,
            nanos_to_wait: 0,
        };
        // 400ms into a 1s cycle: the next cycle starts in 600ms.
        let (next, admitted) = next_state(&state, 400_000_000, SECOND, 1, u64::MAX);
        assert!(admitted);
        assert_eq!(next.nanos_to_wait, 600_000_000);
    }

    #[test]
    fn batch_of_reservations_shares_a_cycle() {
        // limit 2: the first two overdrawers get the next cycle, the third
        // the cycle after.
        let mut state = LimiterState {
            active_cycle: 0,
            active_permissions: 0,
            nanos_to_wait: 0,
        };
        let expected = [SECOND, SECOND, 2 * SECOND];
        for &want in &expected {
            let (next, _) = next_state(&state, 0, SECOND, 2, u64::MAX);
            assert_eq!(next.nanos_to_wait, want);
            state = next;
        }
    }

    #[test]
    fn rejected_state_keeps_rolled_cycle_and_permits() {
        let state = LimiterState {
            active_cycle: 0,
            active_permissions: 0,
            nanos_to_wait: 0,
        };
        let (next, admitted) = next_state(&state, 100, SECOND, 1, 0);
        assert!(!admitted);
        assert_eq!(next.active_permissions, 0, "no decrement on rejection");
        assert_eq!(next.nanos_to_wait, SECOND - 100, "decision stays observable");
    }

    #[test]
    fn admissions_within_a_window_are_bounded() {
        // Invariant: admitted callers over T ns never exceed
        // limit * ceil(T / refresh) + limit.
        let (limiter, clock) = limiter(3, Duration::from_millis(10), Duration::ZERO);
        let total_nanos = 95_000_000u64;
        let step = 500_000u64;
        let mut admitted = 0u64;

        let mut elapsed = 0;
        while elapsed < total_nanos {
            if limiter.acquire().is_ok() {
                admitted += 1;
            }
            clock.advance(step);
            elapsed += step;
        }

        let cycles = total_nanos.div_ceil(10_000_000);
        assert!(admitted <= 3 * cycles + 3, "admitted {admitted} over {cycles} cycles");
    }

    #[test]
    fn change_limit_applies_from_next_acquisition() {
        let (limiter, clock) = limiter(1, Duration::from_secs(1), Duration::ZERO);
        assert!(limiter.acquire().is_ok());
        assert!(limiter.acquire().is_err());

        limiter.change_limit_for_period(3).unwrap();
        clock.advance(SECOND);
        assert!(limiter.acquire().is_ok());
        assert!(limiter.acquire().is_ok());
        assert!(limiter.acquire().is_ok());
        assert!(limiter.acquire().is_err());

        assert!(limiter.change_limit_for_period(0).is_err());
    }

    #[test]
    fn change_timeout_applies_to_acquire() {
        let (limiter, _clock) = limiter(1, Duration::from_secs(1), Duration::ZERO);
        assert!(limiter.acquire().is_ok());
        assert!(limiter.acquire().is_err());

        // A timeout covering a full cycle turns the rejection into a wait;
        // keep it at zero here and just verify the accessor flips.
        limiter.change_timeout_duration(Duration::from_millis(7));
        assert_eq!(limiter.timeout_duration(), Duration::from_millis(7));
    }

    #[test]
    fn metrics_project_rollover() {
        let (limiter, clock) = limiter(2, Duration::from_secs(1), Duration::ZERO);
        assert!(limiter.acquire().is_ok());
        assert!(limiter.acquire().is_ok());
        assert_eq!(limiter.metrics().available_permissions, 0);

        clock.advance(SECOND);
        // No acquisition has published the new cycle yet; the projection
        // already shows the restored budget.
        assert_eq!(limiter.metrics().available_permissions, 2);
    }

    #[test]
    fn events_report_permits_and_rejections() {
        let (limiter, _clock) = limiter(1, Duration::from_secs(1), Duration::ZERO);
        let mut events = limiter.subscribe();

        let _ = limiter.acquire();
        let _ = limiter.acquire();

        assert!(matches!(
            events.try_next(),
            Some(LimiterEvent::Permitted { .. })
        ));
        assert!(matches!(
            events.try_next(),
            Some(LimiterEvent::Rejected { .. })
        ));
        assert!(events.try_next().is_none());
    }
}
