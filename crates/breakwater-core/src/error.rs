//! Error types for the Breakwater core.
//!
//! Two admission failures are value-identified so callers can tell them
//! apart from arbitrary user errors: [`CircuitBreakerOpenError`] and
//! [`RequestNotPermittedError`]. User errors themselves flow through the
//! decorator helpers unchanged, wrapped in [`GuardError::Inner`].

use thiserror::Error;

/// A call was rejected because the named circuit breaker does not admit
/// calls in its current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker '{name}' is open and does not permit calls")]
pub struct CircuitBreakerOpenError {
    /// Name of the rejecting breaker instance.
    pub name: String,
}

/// A call was rejected because the named rate limiter could not grant a
/// permit within the caller's timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limiter '{name}' did not permit the call within the timeout")]
pub struct RequestNotPermittedError {
    /// Name of the rejecting limiter instance.
    pub name: String,
}

/// A configuration value failed validation; the policy is not constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error surface of a decorated call: either an admission failure from the
/// guarding policy, or the user callable's own error, rethrown unchanged.
#[derive(Debug, Error)]
pub enum GuardError<E: std::error::Error> {
    /// The circuit breaker rejected the call; the callable was not invoked.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitBreakerOpenError),
    /// The rate limiter rejected the call; the callable was not invoked.
    #[error(transparent)]
    NotPermitted(#[from] RequestNotPermittedError),
    /// The callable ran and failed with its own error.
    #[error(transparent)]
    Inner(E),
}
