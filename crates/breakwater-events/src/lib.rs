//! Event distribution for Breakwater policy instances.
//!
//! Each policy instance (circuit breaker, rate limiter) owns an [`EventBus`]:
//! a hot single-producer-multi-consumer stream of its events. Emission never
//! blocks the reporting thread; delivery is best-effort per subscriber, with
//! per-subscriber ordering matching the global emission order.
//!
//! This crate provides:
//! - [`EventBus`]: the emitting half, one per policy instance
//! - [`EventStream`]: a subscription handle with non-blocking, blocking, and
//!   async receive operations
//! - [`CircularEventConsumer`]: a bounded consumer retaining the last `K`
//!   events for snapshot-style inspection

pub mod bus;
pub mod circular;
pub mod stream;

pub use bus::EventBus;
pub use circular::CircularEventConsumer;
pub use stream::EventStream;

/// Default per-subscriber buffer capacity used by [`EventBus::new`].
pub const DEFAULT_BUS_CAPACITY: usize = 256;
