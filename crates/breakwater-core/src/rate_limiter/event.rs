//! Observable rate limiter events.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// One entry on a limiter's event stream.
#[derive(Debug, Clone)]
pub enum LimiterEvent {
    /// A caller was granted a permit (possibly after waiting).
    Permitted {
        /// Limiter name.
        name: Arc<str>,
        /// Wall-clock time of the grant.
        at: DateTime<Utc>,
    },
    /// A caller was rejected because its wait would exceed the timeout.
    Rejected {
        /// Limiter name.
        name: Arc<str>,
        /// Wall-clock time of the rejection.
        at: DateTime<Utc>,
    },
}

impl LimiterEvent {
    /// Name of the limiter that emitted this event.
    pub fn limiter_name(&self) -> &str {
        match self {
            Self::Permitted { name, .. } | Self::Rejected { name, .. } => name,
        }
    }

    /// Wall-clock timestamp of the event.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Permitted { at, .. } | Self::Rejected { at, .. } => *at,
        }
    }

    pub(crate) fn permitted(name: &Arc<str>) -> Self {
        Self::Permitted {
            name: Arc::clone(name),
            at: Utc::now(),
        }
    }

    pub(crate) fn rejected(name: &Arc<str>) -> Self {
        Self::Rejected {
            name: Arc::clone(name),
            at: Utc::now(),
        }
    }
}
