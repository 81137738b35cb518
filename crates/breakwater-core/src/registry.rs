//! Named policy registries.
//!
//! A registry maps policy names to shared instances: the first `get` for a
//! name creates the instance (with the registry default configuration or a
//! caller-supplied one), every later `get` returns the same instance.
//! Lookup and creation are atomic per name, so concurrent first access
//! cannot double-create.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::clock::{Clock, RealClock};
use crate::error::ConfigError;
use crate::rate_limiter::{AtomicRateLimiter, LimiterConfig};

/// Registry of named [`CircuitBreaker`] instances.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    default_config: BreakerConfig,
    clock: Arc<dyn Clock>,
    instances: DashMap<String, CircuitBreaker>,
}

impl CircuitBreakerRegistry {
    /// Creates a registry whose instances default to `default_config`.
    ///
    /// The default configuration is validated once, up front, so `get`
    /// itself cannot fail.
    pub fn new(default_config: BreakerConfig) -> Result<Self, ConfigError> {
        default_config.validate()?;
        Ok(Self {
            default_config,
            clock: Arc::new(RealClock::new()),
            instances: DashMap::new(),
        })
    }

    /// Creates a registry with the stock default configuration.
    pub fn of_defaults() -> Self {
        Self {
            default_config: BreakerConfig::default(),
            clock: Arc::new(RealClock::new()),
            instances: DashMap::new(),
        }
    }

    /// Returns the breaker registered under `name`, creating it from the
    /// registry default configuration on first access.
    pub fn get(&self, name: &str) -> CircuitBreaker {
        self.instances
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(breaker = %name, "creating circuit breaker from registry defaults");
                CircuitBreaker::new_validated(
                    name.to_string(),
                    self.default_config.clone(),
                    Arc::clone(&self.clock),
                )
            })
            .clone()
    }

    /// Like [`get`](Self::get), but uses `config` if the instance does not
    /// exist yet. An existing instance is returned as-is and the supplied
    /// configuration is ignored.
    pub fn get_with(&self, name: &str, config: BreakerConfig) -> Result<CircuitBreaker, ConfigError> {
        if let Some(existing) = self.instances.get(name) {
            return Ok(existing.clone());
        }
        config.validate()?;
        Ok(self
            .instances
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(breaker = %name, "creating circuit breaker from supplied config");
                CircuitBreaker::new_validated(name.to_string(), config, Arc::clone(&self.clock))
            })
            .clone())
    }

    /// Names of all registered breakers.
    pub fn names(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::of_defaults()
    }
}

/// Registry of named [`AtomicRateLimiter`] instances.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    default_config: LimiterConfig,
    clock: Arc<dyn Clock>,
    instances: DashMap<String, AtomicRateLimiter>,
}

impl RateLimiterRegistry {
    /// Creates a registry whose instances default to `default_config`.
    pub fn new(default_config: LimiterConfig) -> Result<Self, ConfigError> {
        default_config.validate()?;
        Ok(Self {
            default_config,
            clock: Arc::new(RealClock::new()),
            instances: DashMap::new(),
        })
    }

    /// Creates a registry with the stock default configuration.
    pub fn of_defaults() -> Self {
        Self {
            default_config: LimiterConfig::default(),
            clock: Arc::new(RealClock::new()),
            instances: DashMap::new(),
        }
    }

    /// Returns the limiter registered under `name`, creating it from the
    /// registry default configuration on first access.
    pub fn get(&self, name: &str) -> AtomicRateLimiter {
        self.instances
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(limiter = %name, "creating rate limiter from registry defaults");
                AtomicRateLimiter::new_validated(
                    name.to_string(),
                    self.default_config.clone(),
                    Arc::clone(&self.clock),
                )
            })
            .clone()
    }

    /// Like [`get`](Self::get), but uses `config` if the instance does not
    /// exist yet. An existing instance is returned as-is and the supplied
    /// configuration is ignored.
    pub fn get_with(
        &self,
        name: &str,
        config: LimiterConfig,
    ) -> Result<AtomicRateLimiter, ConfigError> {
        if let Some(existing) = self.instances.get(name) {
            return Ok(existing.clone());
        }
        config.validate()?;
        Ok(self
            .instances
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(limiter = %name, "creating rate limiter from supplied config");
                AtomicRateLimiter::new_validated(name.to_string(), config, Arc::clone(&self.clock))
            })
            .clone())
    }

    /// Names of all registered limiters.
    pub fn names(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::of_defaults()
    }
}
