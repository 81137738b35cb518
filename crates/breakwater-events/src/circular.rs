//! Bounded event consumer keeping the most recent events.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::stream::EventStream;

/// A fixed-capacity consumer that retains the last `K` events in arrival
/// order, dropping the oldest on overflow.
///
/// Events are pulled from the underlying subscription lazily, on each call
/// to [`snapshot`](Self::snapshot), so the consumer imposes no work on the
/// emitting thread.
#[derive(Debug)]
pub struct CircularEventConsumer<E> {
    inner: Mutex<Inner<E>>,
    capacity: usize,
}

#[derive(Debug)]
struct Inner<E> {
    stream: EventStream<E>,
    buffer: VecDeque<E>,
}

impl<E: Clone> CircularEventConsumer<E> {
    /// Wraps a subscription in a consumer retaining up to `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(stream: EventStream<E>, capacity: usize) -> Self {
        assert!(capacity > 0, "circular consumer capacity must be > 0");
        Self {
            inner: Mutex::new(Inner {
                stream,
                buffer: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Drains newly arrived events and returns the retained window,
    /// oldest first.
    pub fn snapshot(&self) -> Vec<E> {
        let mut inner = self.inner.lock();
        while let Some(event) = inner.stream.try_next() {
            if inner.buffer.len() == self.capacity {
                inner.buffer.pop_front();
            }
            inner.buffer.push_back(event);
        }
        inner.buffer.iter().cloned().collect()
    }

    /// Maximum number of retained events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
