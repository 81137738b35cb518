//! Decorator helpers wrapping arbitrary callables with a policy.
//!
//! The core contract is three operations (acquire, report success, report
//! error) and these helpers are the thin generic glue around a callable:
//! acquire a permit (surfacing the admission error without invoking the
//! callable on rejection), time the call, report the outcome, and rethrow
//! the user error unchanged.

use std::time::Instant;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::GuardError;
use crate::rate_limiter::AtomicRateLimiter;

/// Runs `f` under the breaker's admission/report contract.
///
/// On rejection the callable is not invoked and
/// [`GuardError::CircuitOpen`] identifies the breaker by name. The
/// callable's own error is reported to the breaker and rethrown unchanged
/// as [`GuardError::Inner`].
pub fn guarded_call<T, E, F>(breaker: &CircuitBreaker, f: F) -> Result<T, GuardError<E>>
where
    F: FnOnce() -> Result<T, E>,
    E: std::error::Error + 'static,
{
    if !breaker.is_call_permitted() {
        return Err(GuardError::CircuitOpen(breaker.open_error()));
    }

    let started = Instant::now();
    match f() {
        Ok(value) => {
            breaker.on_success(started.elapsed());
            Ok(value)
        }
        Err(error) => {
            breaker.on_error(started.elapsed(), &error);
            Err(GuardError::Inner(error))
        }
    }
}

/// Runs `f` once the limiter grants a permit within its configured
/// timeout.
///
/// On rejection the callable is not invoked and
/// [`GuardError::NotPermitted`] identifies the limiter by name.
pub fn rate_limited_call<T, E, F>(limiter: &AtomicRateLimiter, f: F) -> Result<T, GuardError<E>>
where
    F: FnOnce() -> Result<T, E>,
    E: std::error::Error + 'static,
{
    limiter.acquire().map_err(GuardError::NotPermitted)?;
    f().map_err(GuardError::Inner)
}
