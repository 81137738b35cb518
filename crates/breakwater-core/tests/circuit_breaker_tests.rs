//! Circuit breaker end-to-end scenarios.
//!
//! Drives the public facade through its full lifecycle with a manual clock:
//! threshold trip, half-open recovery and relapse, ignored errors, and the
//! admission invariants around the open timer and the probe budget.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use breakwater_core::circuit_breaker::{BreakerConfig, BreakerEvent, CircuitBreaker, State};
use breakwater_core::clock::{Clock, ManualClock};
use breakwater_core::error::GuardError;
use breakwater_core::guarded_call;

const SECOND: u64 = 1_000_000_000;

fn tripping_breaker(clock: Arc<ManualClock>) -> CircuitBreaker {
    // threshold 50%, closed window 4, half-open window 2, wait 1s
    let config = BreakerConfig::builder()
        .failure_rate_threshold(50.0)
        .ring_buffer_size_in_closed_state(4)
        .ring_buffer_size_in_half_open_state(2)
        .wait_duration_in_open_state(Duration::from_secs(1))
        .build()
        .unwrap();
    CircuitBreaker::with_clock("backend", config, clock as Arc<dyn Clock>).unwrap()
}

fn fail(breaker: &CircuitBreaker) {
    breaker.on_error(Duration::from_millis(5), &io::Error::other("boom"));
}

fn succeed(breaker: &CircuitBreaker) {
    breaker.on_success(Duration::from_millis(5));
}

/// Records [fail, success, fail, success] into a fresh breaker, filling the
/// window at exactly the threshold rate, and returns it open.
fn trip(breaker: &CircuitBreaker) {
    fail(breaker);
    succeed(breaker);
    fail(breaker);
    succeed(breaker);
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn threshold_trip_opens_and_short_circuits() {
    let clock = Arc::new(ManualClock::new());
    let breaker = tripping_breaker(Arc::clone(&clock));
    let mut events = breaker.subscribe();

    fail(&breaker);
    succeed(&breaker);
    fail(&breaker);
    assert_eq!(
        breaker.state(),
        State::Closed,
        "no transition before the window fills"
    );

    succeed(&breaker);
    assert_eq!(breaker.state(), State::Open, "rate 50% >= threshold 50%");

    assert!(!breaker.is_call_permitted());
    let result: Result<(), GuardError<io::Error>> = guarded_call(&breaker, || Ok(()));
    assert!(
        matches!(result, Err(GuardError::CircuitOpen(ref e)) if e.name == "backend"),
        "decorated call surfaces the open error without running"
    );

    let transition = std::iter::from_fn(|| events.try_next())
        .find(|e| matches!(e, BreakerEvent::StateTransition { .. }))
        .expect("transition event emitted");
    assert!(matches!(
        transition,
        BreakerEvent::StateTransition {
            from: State::Closed,
            to: State::Open,
            ..
        }
    ));
}

#[test]
fn open_rejects_until_the_wait_duration_elapses() {
    let clock = Arc::new(ManualClock::new());
    let breaker = tripping_breaker(Arc::clone(&clock));
    trip(&breaker);

    clock.advance(SECOND - 1);
    assert!(!breaker.is_call_permitted(), "timer not yet elapsed");
    assert_eq!(breaker.state(), State::Open);

    clock.advance(1);
    assert!(breaker.is_call_permitted(), "first caller after expiry wins");
    assert_eq!(breaker.state(), State::HalfOpen);
}

#[test]
fn half_open_recovery_closes_with_fresh_metrics() {
    let clock = Arc::new(ManualClock::new());
    let breaker = tripping_breaker(Arc::clone(&clock));
    trip(&breaker);

    clock.advance(SECOND);
    assert!(breaker.is_call_permitted());
    assert_eq!(breaker.state(), State::HalfOpen);

    succeed(&breaker);
    assert_eq!(
        breaker.state(),
        State::HalfOpen,
        "half-open window of 2 not yet full"
    );
    succeed(&breaker);
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().buffered_calls, 0, "metrics were replaced");
}

#[test]
fn half_open_relapse_reopens_and_restarts_the_timer() {
    let clock = Arc::new(ManualClock::new());
    let breaker = tripping_breaker(Arc::clone(&clock));
    trip(&breaker);

    clock.advance(SECOND);
    assert!(breaker.is_call_permitted());

    fail(&breaker);
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);

    // The open timer restarted at the relapse.
    clock.advance(SECOND - 1);
    assert!(!breaker.is_call_permitted());
    clock.advance(1);
    assert!(breaker.is_call_permitted());
}

#[test]
fn half_open_admits_at_most_the_probe_budget_concurrently() {
    let clock = Arc::new(ManualClock::new());
    let breaker = tripping_breaker(Arc::clone(&clock));
    trip(&breaker);

    clock.advance(SECOND);
    // Budget 2: the expiry driver takes the first probe.
    assert!(breaker.is_call_permitted());
    assert!(breaker.is_call_permitted());
    assert!(!breaker.is_call_permitted(), "third concurrent probe rejected");

    // Reporting an outcome frees a probe slot.
    succeed(&breaker);
    assert!(breaker.is_call_permitted());
}

#[test]
fn ignored_errors_leave_breaker_untouched() {
    let clock = Arc::new(ManualClock::new());
    let config = BreakerConfig::builder()
        .ring_buffer_size_in_closed_state(4)
        .record_failure(|e| !e.to_string().contains("transient"))
        .build()
        .unwrap();
    let breaker =
        CircuitBreaker::with_clock("backend", config, clock as Arc<dyn Clock>).unwrap();
    let consumer = breaker.consume_last(16);

    for _ in 0..10 {
        breaker.on_error(Duration::from_millis(1), &io::Error::other("transient glitch"));
    }

    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().buffered_calls, 0);

    let events = consumer.snapshot();
    assert_eq!(events.len(), 10);
    assert!(events
        .iter()
        .all(|e| matches!(e, BreakerEvent::IgnoredError { .. })));
}

#[test]
fn circular_consumer_keeps_only_the_newest_events() {
    let clock = Arc::new(ManualClock::new());
    let breaker = tripping_breaker(Arc::clone(&clock));
    let consumer = breaker.consume_last(3);

    // 4 outcome events + 1 transition = 5 emissions; the window keeps 3.
    trip(&breaker);

    let events = consumer.snapshot();
    assert_eq!(events.len(), 3);
    assert!(
        matches!(events.last(), Some(BreakerEvent::StateTransition { .. })),
        "newest event is the trip transition"
    );
}

#[test]
fn administrative_states_override_the_machine() {
    let clock = Arc::new(ManualClock::new());
    let breaker = tripping_breaker(Arc::clone(&clock));

    breaker.transition_to_forced_open();
    clock.advance(10 * SECOND);
    assert!(
        !breaker.is_call_permitted(),
        "forced-open never transitions on its own"
    );

    breaker.transition_to_disabled();
    assert!(breaker.is_call_permitted());
    fail(&breaker);
    fail(&breaker);
    fail(&breaker);
    fail(&breaker);
    assert_eq!(
        breaker.state(),
        State::Disabled,
        "disabled records nothing and never trips"
    );

    breaker.reset();
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().not_permitted_calls, 0);
}

#[test]
fn outcome_accounting_stays_consistent_under_contention() {
    let clock = Arc::new(ManualClock::new());
    let config = BreakerConfig::builder()
        .failure_rate_threshold(100.0)
        .ring_buffer_size_in_closed_state(64)
        .build()
        .unwrap();
    let breaker =
        CircuitBreaker::with_clock("hammered", config, clock as Arc<dyn Clock>).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let breaker = breaker.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    if (worker + i) % 3 == 0 {
                        breaker.on_error(Duration::ZERO, &io::Error::other("boom"));
                    } else {
                        breaker.on_success(Duration::ZERO);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // The window invariants hold whatever the interleaving was.
    let metrics = breaker.metrics();
    assert_eq!(
        metrics.failed_calls + metrics.successful_calls,
        metrics.buffered_calls
    );
    assert!(metrics.buffered_calls <= metrics.max_buffered_calls);
}
