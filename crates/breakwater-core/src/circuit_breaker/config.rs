//! Circuit breaker configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Classifier deciding whether a reported error counts toward the failure
/// rate. Returning `false` records nothing and emits an ignored-error event.
pub type FailurePredicate = Arc<dyn Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync>;

fn record_every_error() -> FailurePredicate {
    Arc::new(|_| true)
}

/// Immutable configuration of a [`CircuitBreaker`](super::CircuitBreaker).
///
/// Serializes round-trip except for the failure predicate, which
/// deserializes back to the default (every error counts).
#[derive(Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failure rate in percent at or above which the breaker opens.
    /// Must lie in (0, 100]. Default 50.
    pub failure_rate_threshold: f32,
    /// How long an opened breaker rejects calls before probing.
    /// At least 1 ms. Default 60 s.
    pub wait_duration_in_open_state: Duration,
    /// Outcome window size while closed. At least 1. Default 100.
    pub ring_buffer_size_in_closed_state: usize,
    /// Outcome window size (and concurrent probe budget) while half-open.
    /// At least 1. Default 10.
    pub ring_buffer_size_in_half_open_state: usize,
    /// Classifier for reported errors. Default: every error is a failure.
    #[serde(skip, default = "record_every_error")]
    pub record_failure: FailurePredicate,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            wait_duration_in_open_state: Duration::from_secs(60),
            ring_buffer_size_in_closed_state: 100,
            ring_buffer_size_in_half_open_state: 10,
            record_failure: record_every_error(),
        }
    }
}

impl fmt::Debug for BreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerConfig")
            .field("failure_rate_threshold", &self.failure_rate_threshold)
            .field(
                "wait_duration_in_open_state",
                &self.wait_duration_in_open_state,
            )
            .field(
                "ring_buffer_size_in_closed_state",
                &self.ring_buffer_size_in_closed_state,
            )
            .field(
                "ring_buffer_size_in_half_open_state",
                &self.ring_buffer_size_in_half_open_state,
            )
            .finish_non_exhaustive()
    }
}

impl BreakerConfig {
    /// Starts a builder seeded with the defaults.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Fails fast on any out-of-range value; an invalid configuration is
    /// never constructible into a breaker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 100.0) {
            return Err(ConfigError::new(format!(
                "failure_rate_threshold must be in (0, 100], got {}",
                self.failure_rate_threshold
            )));
        }
        if self.wait_duration_in_open_state < Duration::from_millis(1) {
            return Err(ConfigError::new(
                "wait_duration_in_open_state must be at least 1ms",
            ));
        }
        if self.ring_buffer_size_in_closed_state < 1 {
            return Err(ConfigError::new(
                "ring_buffer_size_in_closed_state must be at least 1",
            ));
        }
        if self.ring_buffer_size_in_half_open_state < 1 {
            return Err(ConfigError::new(
                "ring_buffer_size_in_half_open_state must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`BreakerConfig`].
pub struct BreakerConfigBuilder {
    config: BreakerConfig,
}

impl BreakerConfigBuilder {
    /// Sets the failure rate (percent) at which the breaker opens.
    pub fn failure_rate_threshold(mut self, percent: f32) -> Self {
        self.config.failure_rate_threshold = percent;
        self
    }

    /// Sets how long the breaker stays open before probing.
    pub fn wait_duration_in_open_state(mut self, wait: Duration) -> Self {
        self.config.wait_duration_in_open_state = wait;
        self
    }

    /// Sets the closed-state outcome window size.
    pub fn ring_buffer_size_in_closed_state(mut self, size: usize) -> Self {
        self.config.ring_buffer_size_in_closed_state = size;
        self
    }

    /// Sets the half-open outcome window size and probe budget.
    pub fn ring_buffer_size_in_half_open_state(mut self, size: usize) -> Self {
        self.config.ring_buffer_size_in_half_open_state = size;
        self
    }

    /// Installs the error classifier.
    pub fn record_failure(
        mut self,
        predicate: impl Fn(&(dyn std::error::Error + 'static)) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.config.record_failure = Arc::new(predicate);
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<BreakerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
