//! Observable circuit breaker events.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::state_machine::State;

/// One entry on a breaker's event stream.
///
/// Events carry the policy name and a wall-clock timestamp; call-outcome
/// events additionally carry the guarded call's elapsed duration. The
/// `cause` of error events is the rendered error message.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The breaker moved between states.
    StateTransition {
        /// Breaker name.
        name: Arc<str>,
        /// State before the transition.
        from: State,
        /// State after the transition.
        to: State,
        /// Wall-clock time of the transition.
        at: DateTime<Utc>,
    },
    /// A guarded call succeeded and was recorded.
    Success {
        /// Breaker name.
        name: Arc<str>,
        /// Elapsed duration of the guarded call.
        duration: Duration,
        /// Wall-clock time of the recording.
        at: DateTime<Utc>,
    },
    /// A guarded call failed and was recorded as a counted failure.
    Error {
        /// Breaker name.
        name: Arc<str>,
        /// Elapsed duration of the guarded call.
        duration: Duration,
        /// Rendered message of the causing error.
        cause: String,
        /// Wall-clock time of the recording.
        at: DateTime<Utc>,
    },
    /// A reported error was classified as not-a-failure and left the
    /// metrics untouched.
    IgnoredError {
        /// Breaker name.
        name: Arc<str>,
        /// Elapsed duration of the guarded call.
        duration: Duration,
        /// Rendered message of the ignored error.
        cause: String,
        /// Wall-clock time of the report.
        at: DateTime<Utc>,
    },
    /// An admission check was rejected.
    CallNotPermitted {
        /// Breaker name.
        name: Arc<str>,
        /// Wall-clock time of the rejection.
        at: DateTime<Utc>,
    },
    /// The breaker was administratively reset to closed.
    Reset {
        /// Breaker name.
        name: Arc<str>,
        /// Wall-clock time of the reset.
        at: DateTime<Utc>,
    },
}

impl BreakerEvent {
    /// Name of the breaker that emitted this event.
    pub fn breaker_name(&self) -> &str {
        match self {
            Self::StateTransition { name, .. }
            | Self::Success { name, .. }
            | Self::Error { name, .. }
            | Self::IgnoredError { name, .. }
            | Self::CallNotPermitted { name, .. }
            | Self::Reset { name, .. } => name,
        }
    }

    /// Wall-clock timestamp of the event.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::StateTransition { at, .. }
            | Self::Success { at, .. }
            | Self::Error { at, .. }
            | Self::IgnoredError { at, .. }
            | Self::CallNotPermitted { at, .. }
            | Self::Reset { at, .. } => *at,
        }
    }

    pub(crate) fn transition(name: &Arc<str>, from: State, to: State) -> Self {
        Self::StateTransition {
            name: Arc::clone(name),
            from,
            to,
            at: Utc::now(),
        }
    }

    pub(crate) fn success(name: &Arc<str>, duration: Duration) -> Self {
        Self::Success {
            name: Arc::clone(name),
            duration,
            at: Utc::now(),
        }
    }

    pub(crate) fn error(name: &Arc<str>, duration: Duration, cause: String) -> Self {
        Self::Error {
            name: Arc::clone(name),
            duration,
            cause,
            at: Utc::now(),
        }
    }

    pub(crate) fn ignored_error(name: &Arc<str>, duration: Duration, cause: String) -> Self {
        Self::IgnoredError {
            name: Arc::clone(name),
            duration,
            cause,
            at: Utc::now(),
        }
    }

    pub(crate) fn not_permitted(name: &Arc<str>) -> Self {
        Self::CallNotPermitted {
            name: Arc::clone(name),
            at: Utc::now(),
        }
    }

    pub(crate) fn reset(name: &Arc<str>) -> Self {
        Self::Reset {
            name: Arc::clone(name),
            at: Utc::now(),
        }
    }
}
