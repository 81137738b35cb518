//! Failure-rate metrics over one outcome window.

use super::ring_bit_buffer::RingBitBuffer;

/// Wraps a [`RingBitBuffer`] and turns its counts into a failure rate.
///
/// The rate is defined only once the window has been filled; until then the
/// sample is considered insufficient and the breaker never transitions on
/// rate alone.
#[derive(Debug)]
pub(crate) struct BreakerMetrics {
    ring: RingBitBuffer,
}

impl BreakerMetrics {
    pub(crate) fn new(window_size: usize) -> Self {
        Self {
            ring: RingBitBuffer::new(window_size),
        }
    }

    /// Records a successful call, returning the failure rate after the write
    /// when the window is saturated.
    pub(crate) fn record_success(&self) -> Option<f32> {
        self.record(false)
    }

    /// Records a failed call, returning the failure rate after the write
    /// when the window is saturated.
    pub(crate) fn record_failure(&self) -> Option<f32> {
        self.record(true)
    }

    fn record(&self, failure: bool) -> Option<f32> {
        let failures = self.ring.set_next_bit(failure);
        self.ring
            .is_full()
            .then(|| 100.0 * failures as f32 / self.ring.capacity() as f32)
    }

    /// Current failure rate, or `None` while the window is not yet full.
    pub(crate) fn failure_rate(&self) -> Option<f32> {
        self.ring
            .is_full()
            .then(|| 100.0 * self.ring.cardinality() as f32 / self.ring.capacity() as f32)
    }

    pub(crate) fn number_of_buffered_calls(&self) -> usize {
        self.ring.len()
    }

    pub(crate) fn number_of_failed_calls(&self) -> usize {
        self.ring.cardinality()
    }

    pub(crate) fn number_of_successful_calls(&self) -> usize {
        self.ring.len() - self.ring.cardinality()
    }

    pub(crate) fn max_number_of_buffered_calls(&self) -> usize {
        self.ring.capacity()
    }
}

/// Point-in-time view of a breaker's call accounting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    /// Failure rate in percent, defined only for a saturated window.
    pub failure_rate: Option<f32>,
    /// Outcomes currently held in the window.
    pub buffered_calls: usize,
    /// Failed outcomes in the window.
    pub failed_calls: usize,
    /// Successful outcomes in the window.
    pub successful_calls: usize,
    /// Window capacity of the current state.
    pub max_buffered_calls: usize,
    /// Calls rejected at admission since construction or the last reset.
    pub not_permitted_calls: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_undefined_until_window_fills() {
        let metrics = BreakerMetrics::new(3);
        assert_eq!(metrics.record_failure(), None);
        assert_eq!(metrics.record_failure(), None);
        assert_eq!(metrics.failure_rate(), None);

        let rate = metrics.record_success().expect("window just filled");
        assert!((rate - 66.666_67).abs() < 0.01);
        assert_eq!(metrics.failure_rate(), Some(rate));
    }

    #[test]
    fn counts_split_between_failures_and_successes() {
        let metrics = BreakerMetrics::new(4);
        metrics.record_failure();
        metrics.record_success();
        metrics.record_success();

        assert_eq!(metrics.number_of_buffered_calls(), 3);
        assert_eq!(metrics.number_of_failed_calls(), 1);
        assert_eq!(metrics.number_of_successful_calls(), 2);
        assert_eq!(metrics.max_number_of_buffered_calls(), 4);
    }

    #[test]
    fn rate_tracks_overwrites_once_saturated() {
        let metrics = BreakerMetrics::new(2);
        metrics.record_failure();
        assert_eq!(metrics.record_failure(), Some(100.0));

        // Oldest failure replaced by a success.
        assert_eq!(metrics.record_success(), Some(50.0));
        assert_eq!(metrics.record_success(), Some(0.0));
    }
}
