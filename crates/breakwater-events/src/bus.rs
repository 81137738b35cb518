//! Hot broadcast bus backing a single policy instance.

use tokio::sync::broadcast;
use tracing::debug;

use crate::stream::EventStream;
use crate::DEFAULT_BUS_CAPACITY;

/// Single-producer-multi-consumer event stream for one policy instance.
///
/// Built on a broadcast channel: every subscriber gets its own bounded
/// buffer, emission never blocks, and a subscriber that falls behind drops
/// the oldest events it has not yet consumed. Past events are not replayed
/// to new subscribers.
#[derive(Debug)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
    capacity: usize,
}

impl<E: Clone> EventBus<E> {
    /// Creates a bus with the default per-subscriber buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Creates a bus whose subscribers each buffer up to `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be > 0");
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Emits an event to all current subscribers.
    ///
    /// Never blocks and never fails: with no subscribers the event is
    /// dropped. Returns the number of subscribers the event was delivered to.
    pub fn emit(&self, event: E) -> usize {
        match self.sender.send(event) {
            Ok(subscribers) => subscribers,
            Err(_) => {
                debug!("event dropped, no active subscribers");
                0
            }
        }
    }

    /// Registers a new subscriber receiving events from this point onward.
    pub fn subscribe(&self) -> EventStream<E> {
        EventStream::new(self.sender.subscribe())
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Per-subscriber buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
