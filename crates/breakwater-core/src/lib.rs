//! Breakwater Core - process-local fault tolerance primitives
//!
//! This crate provides the two policies at the heart of Breakwater:
//!
//! - **Circuit Breaker**: short-circuits calls to a failing collaborator
//!   once the failure rate over a full outcome window reaches a threshold
//! - **Atomic Rate Limiter**: admits a bounded number of callers per
//!   refresh cycle through a single compare-and-swap on an immutable state
//!   triple
//!
//! Both are built for hot paths shared by many threads: admission decisions
//! avoid locks in the common states, and every policy instance fans out its
//! events on a non-blocking stream (see `breakwater-events`).
//!
//! Supporting pieces: per-name [`registry`] instances, [`decorate`] helpers
//! wrapping arbitrary callables, a [`clock`] abstraction for deterministic
//! tests, and typed [`error`] values that keep admission failures
//! distinguishable from user errors.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod circuit_breaker;
pub mod clock;
pub mod decorate;
pub mod error;
pub mod rate_limiter;
pub mod registry;

// Re-export the types most callers touch.
pub use circuit_breaker::{BreakerConfig, BreakerEvent, CircuitBreaker, MetricsSnapshot, State};
pub use clock::{Clock, ManualClock, RealClock};
pub use decorate::{guarded_call, rate_limited_call};
pub use error::{CircuitBreakerOpenError, ConfigError, GuardError, RequestNotPermittedError};
pub use rate_limiter::{AtomicRateLimiter, LimiterConfig, LimiterEvent, LimiterMetrics};
pub use registry::{CircuitBreakerRegistry, RateLimiterRegistry};
