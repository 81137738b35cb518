//! The breaker's five-state machine.
//!
//! Admission in `Closed` and `Disabled` is decided off an atomic state tag
//! without taking a lock; everything that can change state (outcome
//! recording, the lazy open-timer transition, administrative moves)
//! serializes through a single mutex, which is also the linearization point
//! for the outcome sequence and keeps bus emission ordered consistently
//! with it.

use std::fmt;
use std::sync::atomic::{
    AtomicU64, AtomicU8,
    Ordering::{Acquire, Relaxed, Release},
};
use std::sync::Arc;
use std::time::Duration;

use breakwater_events::{CircularEventConsumer, EventBus, EventStream};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::BreakerConfig;
use super::event::BreakerEvent;
use super::metrics::{BreakerMetrics, MetricsSnapshot};
use crate::clock::Clock;

/// Observable state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    /// All calls admitted; outcomes fill the closed-state window.
    Closed,
    /// All calls rejected until the open timer elapses.
    Open,
    /// A bounded number of probe calls admitted to test recovery.
    HalfOpen,
    /// All calls admitted, nothing recorded, no transitions.
    Disabled,
    /// All calls rejected, no transitions, until moved out explicitly.
    ForcedOpen,
}

impl State {
    const fn as_tag(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
            Self::Disabled => 3,
            Self::ForcedOpen => 4,
        }
    }

    const fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::Open,
            2 => Self::HalfOpen,
            3 => Self::Disabled,
            4 => Self::ForcedOpen,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
            Self::Disabled => write!(f, "disabled"),
            Self::ForcedOpen => write!(f, "forced-open"),
        }
    }
}

/// State data: each variant carries exactly what that state needs.
#[derive(Debug)]
enum ActiveState {
    Closed {
        metrics: BreakerMetrics,
    },
    Open {
        opened_at_nanos: u64,
        /// Half-open-sized buffer absorbing reports from calls that were
        /// admitted before the trip and finished after it.
        metrics: BreakerMetrics,
    },
    HalfOpen {
        free_probes: usize,
        metrics: BreakerMetrics,
    },
    Disabled,
    ForcedOpen,
}

impl ActiveState {
    fn tag(&self) -> State {
        match self {
            Self::Closed { .. } => State::Closed,
            Self::Open { .. } => State::Open,
            Self::HalfOpen { .. } => State::HalfOpen,
            Self::Disabled => State::Disabled,
            Self::ForcedOpen => State::ForcedOpen,
        }
    }
}

enum Admission {
    Allow,
    /// Open timer elapsed: the caller drives the half-open transition and
    /// takes the first probe slot.
    Probe,
    Deny,
}

#[derive(Debug)]
pub(crate) struct StateMachine {
    name: Arc<str>,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    state_tag: AtomicU8,
    active: Mutex<ActiveState>,
    not_permitted: AtomicU64,
    bus: EventBus<BreakerEvent>,
}

impl StateMachine {
    pub(crate) fn new(name: Arc<str>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let metrics = BreakerMetrics::new(config.ring_buffer_size_in_closed_state);
        Self {
            name,
            config,
            clock,
            state_tag: AtomicU8::new(State::Closed.as_tag()),
            active: Mutex::new(ActiveState::Closed { metrics }),
            not_permitted: AtomicU64::new(0),
            bus: EventBus::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> State {
        State::from_tag(self.state_tag.load(Acquire))
    }

    /// Admission check. May lazily drive `Open` to `HalfOpen` once the open
    /// timer has elapsed; the first caller to observe the expiry wins and is
    /// admitted as the initial probe.
    pub(crate) fn is_call_permitted(&self) -> bool {
        match self.state() {
            // Lock-free fast path for the common states.
            State::Closed | State::Disabled => true,
            State::ForcedOpen => {
                self.reject();
                false
            }
            State::Open | State::HalfOpen => self.permit_slow(),
        }
    }

    fn permit_slow(&self) -> bool {
        let mut active = self.active.lock();
        // Re-inspect under the lock: the tag may be stale by now.
        let admission = match &mut *active {
            ActiveState::Closed { .. } | ActiveState::Disabled => Admission::Allow,
            ActiveState::ForcedOpen => Admission::Deny,
            ActiveState::Open {
                opened_at_nanos, ..
            } => {
                let elapsed = self.clock.now_nanos().saturating_sub(*opened_at_nanos);
                if elapsed >= duration_to_nanos(self.config.wait_duration_in_open_state) {
                    Admission::Probe
                } else {
                    Admission::Deny
                }
            }
            ActiveState::HalfOpen { free_probes, .. } => {
                if *free_probes > 0 {
                    *free_probes -= 1;
                    Admission::Allow
                } else {
                    Admission::Deny
                }
            }
        };

        match admission {
            Admission::Allow => true,
            Admission::Probe => {
                let budget = self.config.ring_buffer_size_in_half_open_state;
                self.transition(
                    &mut active,
                    ActiveState::HalfOpen {
                        free_probes: budget - 1,
                        metrics: BreakerMetrics::new(budget),
                    },
                );
                true
            }
            Admission::Deny => {
                drop(active);
                self.reject();
                false
            }
        }
    }

    fn reject(&self) {
        self.not_permitted.fetch_add(1, Relaxed);
        debug!(breaker = %self.name, "call not permitted");
        self.bus.emit(BreakerEvent::not_permitted(&self.name));
    }

    /// Records a successful call against the state current at recording
    /// time and evaluates the transition predicates.
    pub(crate) fn on_success(&self, duration: Duration) {
        let mut active = self.active.lock();
        let rate = match &mut *active {
            ActiveState::Disabled | ActiveState::ForcedOpen => return,
            ActiveState::Closed { metrics } => metrics.record_success(),
            ActiveState::Open { metrics, .. } => {
                // Stale report from a call admitted before the trip; open
                // exits only via its timer.
                metrics.record_success();
                None
            }
            ActiveState::HalfOpen {
                metrics,
                free_probes,
            } => {
                *free_probes =
                    (*free_probes + 1).min(self.config.ring_buffer_size_in_half_open_state);
                metrics.record_success()
            }
        };
        self.bus.emit(BreakerEvent::success(&self.name, duration));
        self.evaluate_rate(&mut active, rate);
    }

    /// Records a failed call. The configured predicate classifies the error
    /// first; an ignored error touches neither metrics nor state.
    pub(crate) fn on_error(&self, duration: Duration, error: &(dyn std::error::Error + 'static)) {
        if !(self.config.record_failure)(error) {
            debug!(breaker = %self.name, error = %error, "error ignored by predicate");
            self.bus.emit(BreakerEvent::ignored_error(
                &self.name,
                duration,
                error.to_string(),
            ));
            return;
        }

        let mut active = self.active.lock();
        let rate = match &mut *active {
            ActiveState::Disabled | ActiveState::ForcedOpen => return,
            ActiveState::Closed { metrics } => metrics.record_failure(),
            ActiveState::Open { metrics, .. } => {
                metrics.record_failure();
                None
            }
            ActiveState::HalfOpen {
                metrics,
                free_probes,
            } => {
                *free_probes =
                    (*free_probes + 1).min(self.config.ring_buffer_size_in_half_open_state);
                metrics.record_failure()
            }
        };
        self.bus.emit(BreakerEvent::error(
            &self.name,
            duration,
            error.to_string(),
        ));
        self.evaluate_rate(&mut active, rate);
    }

    /// Applies the threshold rule once the window of the current state is
    /// saturated. A window that never fills drives no transition.
    fn evaluate_rate(&self, active: &mut ActiveState, rate: Option<f32>) {
        let Some(rate) = rate else { return };
        let threshold = self.config.failure_rate_threshold;
        match active.tag() {
            State::Closed if rate >= threshold => {
                warn!(
                    breaker = %self.name,
                    rate,
                    threshold,
                    "failure rate threshold reached, opening circuit"
                );
                self.trip_open(active);
            }
            State::HalfOpen => {
                if rate >= threshold {
                    warn!(
                        breaker = %self.name,
                        rate,
                        threshold,
                        "probe window failed, reopening circuit"
                    );
                    self.trip_open(active);
                } else {
                    let metrics =
                        BreakerMetrics::new(self.config.ring_buffer_size_in_closed_state);
                    self.transition(active, ActiveState::Closed { metrics });
                }
            }
            _ => {}
        }
    }

    fn trip_open(&self, active: &mut ActiveState) {
        self.transition(
            active,
            ActiveState::Open {
                opened_at_nanos: self.clock.now_nanos(),
                metrics: BreakerMetrics::new(self.config.ring_buffer_size_in_half_open_state),
            },
        );
    }

    fn transition(&self, active: &mut ActiveState, next: ActiveState) {
        let from = active.tag();
        let to = next.tag();
        *active = next;
        self.state_tag.store(to.as_tag(), Release);
        info!(breaker = %self.name, %from, %to, "circuit breaker state transition");
        self.bus
            .emit(BreakerEvent::transition(&self.name, from, to));
    }

    /// Moves to `Disabled`: admit everything, record nothing.
    pub(crate) fn transition_to_disabled(&self) {
        let mut active = self.active.lock();
        if active.tag() != State::Disabled {
            self.transition(&mut active, ActiveState::Disabled);
        }
    }

    /// Moves to `ForcedOpen`: reject everything until moved out.
    pub(crate) fn transition_to_forced_open(&self) {
        let mut active = self.active.lock();
        if active.tag() != State::ForcedOpen {
            self.transition(&mut active, ActiveState::ForcedOpen);
        }
    }

    /// Returns to `Closed` with fresh metrics and counters. Idempotent.
    pub(crate) fn reset(&self) {
        let mut active = self.active.lock();
        let from = active.tag();
        *active = ActiveState::Closed {
            metrics: BreakerMetrics::new(self.config.ring_buffer_size_in_closed_state),
        };
        self.state_tag.store(State::Closed.as_tag(), Release);
        self.not_permitted.store(0, Relaxed);
        info!(breaker = %self.name, %from, "circuit breaker reset");
        self.bus.emit(BreakerEvent::reset(&self.name));
    }

    pub(crate) fn metrics(&self) -> MetricsSnapshot {
        let active = self.active.lock();
        let not_permitted_calls = self.not_permitted.load(Relaxed);
        match &*active {
            ActiveState::Closed { metrics }
            | ActiveState::Open { metrics, .. }
            | ActiveState::HalfOpen { metrics, .. } => MetricsSnapshot {
                failure_rate: metrics.failure_rate(),
                buffered_calls: metrics.number_of_buffered_calls(),
                failed_calls: metrics.number_of_failed_calls(),
                successful_calls: metrics.number_of_successful_calls(),
                max_buffered_calls: metrics.max_number_of_buffered_calls(),
                not_permitted_calls,
            },
            ActiveState::Disabled | ActiveState::ForcedOpen => MetricsSnapshot {
                failure_rate: None,
                buffered_calls: 0,
                failed_calls: 0,
                successful_calls: 0,
                max_buffered_calls: 0,
                not_permitted_calls,
            },
        }
    }

    pub(crate) fn subscribe(&self) -> EventStream<BreakerEvent> {
        self.bus.subscribe()
    }

    pub(crate) fn consume_last(&self, capacity: usize) -> CircularEventConsumer<BreakerEvent> {
        CircularEventConsumer::new(self.bus.subscribe(), capacity)
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
