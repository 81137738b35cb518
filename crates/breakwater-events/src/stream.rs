//! Subscription handle for a policy instance's event bus.

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tracing::warn;

/// The receiving half of an [`EventBus`](crate::EventBus) subscription.
///
/// Each stream has its own bounded buffer. A stream that falls behind the
/// emitter loses the oldest unconsumed events; the count of lost events is
/// tracked in [`dropped`](Self::dropped). Dropping the stream unsubscribes.
#[derive(Debug)]
pub struct EventStream<E> {
    receiver: Receiver<E>,
    dropped: u64,
}

impl<E: Clone> EventStream<E> {
    pub(crate) fn new(receiver: Receiver<E>) -> Self {
        Self {
            receiver,
            dropped: 0,
        }
    }

    /// Returns the next buffered event without blocking, or `None` when the
    /// buffer is currently empty or the bus is gone.
    pub fn try_next(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => {
                    self.note_lag(missed);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Waits for the next event. Returns `None` once the bus is dropped and
    /// all buffered events were consumed.
    pub async fn next(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    self.note_lag(missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Blocking variant of [`next`](Self::next) for plain-thread subscribers.
    pub fn blocking_next(&mut self) -> Option<E> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    self.note_lag(missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Total number of events this subscriber lost by lagging behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn note_lag(&mut self, missed: u64) {
        self.dropped += missed;
        warn!(missed, "subscriber lagged, oldest events dropped");
    }
}
