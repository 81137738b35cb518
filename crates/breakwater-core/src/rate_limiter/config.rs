//! Rate limiter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration of an [`AtomicRateLimiter`](super::AtomicRateLimiter).
///
/// `limit_for_period` and `timeout_duration` can later be changed at
/// runtime on the limiter itself; the refresh period is fixed for the
/// lifetime of the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Permits granted per refresh cycle. At least 1. Default 50.
    pub limit_for_period: u32,
    /// Length of one permit cycle. At least 1 ns. Default 500 ns.
    pub limit_refresh_period: Duration,
    /// Default wait budget for `acquire`. Default 5 s.
    pub timeout_duration: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit_for_period: 50,
            limit_refresh_period: Duration::from_nanos(500),
            timeout_duration: Duration::from_secs(5),
        }
    }
}

impl LimiterConfig {
    /// Starts a builder seeded with the defaults.
    pub fn builder() -> LimiterConfigBuilder {
        LimiterConfigBuilder {
            config: Self::default(),
        }
    }

    /// Fails fast on any out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit_for_period < 1 {
            return Err(ConfigError::new("limit_for_period must be at least 1"));
        }
        if self.limit_refresh_period < Duration::from_nanos(1) {
            return Err(ConfigError::new(
                "limit_refresh_period must be at least 1ns",
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`LimiterConfig`].
pub struct LimiterConfigBuilder {
    config: LimiterConfig,
}

impl LimiterConfigBuilder {
    /// Sets the permits granted per refresh cycle.
    pub fn limit_for_period(mut self, limit: u32) -> Self {
        self.config.limit_for_period = limit;
        self
    }

    /// Sets the cycle length.
    pub fn limit_refresh_period(mut self, period: Duration) -> Self {
        self.config.limit_refresh_period = period;
        self
    }

    /// Sets the default wait budget.
    pub fn timeout_duration(mut self, timeout: Duration) -> Self {
        self.config.timeout_duration = timeout;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<LimiterConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
