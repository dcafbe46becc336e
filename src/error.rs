//! Error types for rate limiting
use crate::config::Scope;
use std::fmt;
use std::time::Duration;

/// Message shown to end users when the shared limit is exhausted.
pub const SHARED_LIMIT_MESSAGE: &str = ":face_with_peeking_eye: There's currently too much pressure on the bot, so we'll have to skip your request. Try again later!";

/// Message shown to end users when their own limit is exhausted.
pub const PER_KEY_LIMIT_MESSAGE: &str =
    ":face_with_peeking_eye: You might want to slow down a bit with these commands. Try again later!";

/// Errors returned by a [`RateLimiterRegistry`](crate::RateLimiterRegistry).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// The bucket is empty. Routine and recoverable: wait `retry_after` and try again.
    #[error("rate limited ({scope} limit of {limit}, retry after {retry_after:?})")]
    RateLimited {
        /// Scope of the exhausted bucket.
        scope: Scope,
        /// Tokens per window.
        limit: u32,
        /// Whole tokens left; always zero for single-unit requests.
        remaining: u32,
        /// Time until one token is available again.
        retry_after: Duration,
    },
    /// A per-key operation was called on a shared registry. This is a configuration bug.
    #[error("{operation} is not supported on a {scope} rate limiter")]
    UnsupportedOperation {
        /// The rejected operation.
        operation: &'static str,
        /// Scope of the registry it was called on.
        scope: Scope,
    },
}

impl RateLimitError {
    /// Check if this error is a routine rate-limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if this error is a scope misuse.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation { .. })
    }

    /// Retry hint for rate-limit rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Scope of the registry that produced the error.
    pub fn scope(&self) -> Scope {
        match self {
            Self::RateLimited { scope, .. } | Self::UnsupportedOperation { scope, .. } => *scope,
        }
    }

    /// Text suitable for replying to the end user whose request was rejected.
    ///
    /// `None` for [`UnsupportedOperation`](Self::UnsupportedOperation): that is a
    /// configuration bug, not something to explain to a user.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::RateLimited { scope: Scope::Shared, .. } => Some(SHARED_LIMIT_MESSAGE),
            Self::RateLimited { scope: Scope::PerKey, .. } => Some(PER_KEY_LIMIT_MESSAGE),
            Self::UnsupportedOperation { .. } => None,
        }
    }
}

/// Error from an operation or service guarded by a rate limiter.
#[derive(Debug, Clone)]
pub enum GuardError<E> {
    /// The limiter refused the call; the operation was not run.
    Limited(RateLimitError),
    /// The guarded operation ran and failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for GuardError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(e) => write!(f, "{}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for GuardError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Limited(e) => Some(e),
            Self::Inner(e) => Some(e),
        }
    }
}

impl<E> From<RateLimitError> for GuardError<E> {
    fn from(err: RateLimitError) -> Self {
        Self::Limited(err)
    }
}

impl<E> GuardError<E> {
    /// Check if the call was refused by a full bucket.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Limited(e) if e.is_rate_limited())
    }
    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
    /// Borrow the limiter error if present.
    pub fn as_limited(&self) -> Option<&RateLimitError> {
        match self {
            Self::Limited(e) => Some(e),
            _ => None,
        }
    }
    /// Retry hint when the call was rate limited.
    pub fn retry_after(&self) -> Option<Duration> {
        self.as_limited().and_then(RateLimitError::retry_after)
    }
}
