//! Failure-rate circuit breaker.
//!
//! The breaker observes reported call outcomes through a fixed-size ring
//! bit buffer and short-circuits callers once the failure rate over a full
//! window reaches the configured threshold. Admission decisions in the
//! common states are lock-free.
//!
//! ```
//! use std::time::Duration;
//! use breakwater_core::circuit_breaker::{BreakerConfig, CircuitBreaker};
//!
//! let breaker = CircuitBreaker::new(
//!     "search-backend",
//!     BreakerConfig::builder()
//!         .failure_rate_threshold(50.0)
//!         .ring_buffer_size_in_closed_state(100)
//!         .build()?,
//! )?;
//!
//! if breaker.is_call_permitted() {
//!     // perform the guarded call, then report:
//!     breaker.on_success(Duration::from_millis(12));
//! }
//! # Ok::<(), breakwater_core::ConfigError>(())
//! ```

mod config;
mod event;
mod metrics;
mod ring_bit_buffer;
mod state_machine;

pub use config::{BreakerConfig, BreakerConfigBuilder, FailurePredicate};
pub use event::BreakerEvent;
pub use metrics::MetricsSnapshot;
pub use ring_bit_buffer::RingBitBuffer;
pub use state_machine::State;

use std::sync::Arc;
use std::time::Duration;

use breakwater_events::{CircularEventConsumer, EventStream};

use crate::clock::{Clock, RealClock};
use crate::error::{CircuitBreakerOpenError, ConfigError};
use state_machine::StateMachine;

/// A named circuit breaker instance.
///
/// Cheap to clone; all clones share the same state machine and event bus.
/// This type only composes the state machine, metrics, and bus behind the
/// admission/report contract.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    inner: Arc<StateMachine>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given name and configuration.
    ///
    /// Fails fast with [`ConfigError`] on invalid configuration values.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Result<Self, ConfigError> {
        Self::with_clock(name, config, Arc::new(RealClock::new()))
    }

    /// Creates a breaker driven by the supplied clock. Useful for tests.
    pub fn with_clock(
        name: impl Into<String>,
        config: BreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new_validated(name.into(), config, clock))
    }

    pub(crate) fn new_validated(name: String, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(StateMachine::new(Arc::from(name.as_str()), config, clock)),
        }
    }

    /// Returns whether a call may proceed right now.
    ///
    /// In `Open`, the first check after the open timer elapses drives the
    /// transition to `HalfOpen` and admits the caller as a probe.
    pub fn is_call_permitted(&self) -> bool {
        self.inner.is_call_permitted()
    }

    /// Reports a successful call of the given duration.
    pub fn on_success(&self, duration: Duration) {
        self.inner.on_success(duration)
    }

    /// Reports a failed call. The configured predicate decides whether the
    /// error counts toward the failure rate or is merely observed.
    pub fn on_error(&self, duration: Duration, error: &(dyn std::error::Error + 'static)) {
        self.inner.on_error(duration, error)
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.inner.state()
    }

    /// Point-in-time call accounting of the current state's window.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics()
    }

    /// Name of this instance.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The configuration this breaker was built with.
    pub fn config(&self) -> &BreakerConfig {
        self.inner.config()
    }

    /// Administratively disables the breaker: all calls admitted, nothing
    /// recorded, no automatic transitions.
    pub fn transition_to_disabled(&self) {
        self.inner.transition_to_disabled()
    }

    /// Administratively forces the breaker open: all calls rejected until
    /// it is explicitly moved out of this state.
    pub fn transition_to_forced_open(&self) {
        self.inner.transition_to_forced_open()
    }

    /// Returns the breaker to `Closed` with fresh metrics.
    pub fn reset(&self) {
        self.inner.reset()
    }

    /// Subscribes to this breaker's event stream from this point onward.
    pub fn subscribe(&self) -> EventStream<BreakerEvent> {
        self.inner.subscribe()
    }

    /// Returns a bounded consumer retaining the last `capacity` events.
    pub fn consume_last(&self, capacity: usize) -> CircularEventConsumer<BreakerEvent> {
        self.inner.consume_last(capacity)
    }

    /// The admission error value identifying this breaker.
    pub fn open_error(&self) -> CircuitBreakerOpenError {
        CircuitBreakerOpenError {
            name: self.inner.name().to_string(),
        }
    }
}
