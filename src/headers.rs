//! Standard rate-limit response headers for HTTP collaborators.

use crate::error::RateLimitError;
use crate::registry::Admission;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `Retry-After`, in whole seconds.
pub const RETRY_AFTER: &str = "Retry-After";
/// `X-RateLimit-Limit`, tokens per window.
pub const X_RATELIMIT_LIMIT: &str = "X-RateLimit-Limit";
/// `X-RateLimit-Remaining`, tokens left.
pub const X_RATELIMIT_REMAINING: &str = "X-RateLimit-Remaining";
/// `X-RateLimit-Reset`, unix timestamp in seconds.
pub const X_RATELIMIT_RESET: &str = "X-RateLimit-Reset";

/// Header values derived from a registry decision.
///
/// Transport-agnostic: convert with [`to_pairs`](Self::to_pairs) into whatever
/// header map the server framework uses, and answer `429 Too Many Requests` when
/// [`retry_after_secs`](Self::retry_after_secs) is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Tokens per window.
    pub limit: u32,
    /// Tokens left.
    pub remaining: u32,
    /// When the bucket is full again (admission) or the next token lands (rejection).
    pub reset_unix_secs: u64,
    /// Seconds to wait; present only on rejection.
    pub retry_after_secs: Option<u64>,
}

impl RateLimitHeaders {
    /// Headers for an admitted request.
    pub fn from_admission(admission: &Admission, now: SystemTime) -> Self {
        Self {
            limit: admission.limit,
            remaining: admission.remaining,
            reset_unix_secs: unix_secs_ceil(now + admission.reset_after),
            retry_after_secs: None,
        }
    }

    /// Headers for a rejected request; `None` unless `err` is `RateLimited`.
    pub fn from_rejection(err: &RateLimitError, now: SystemTime) -> Option<Self> {
        match err {
            RateLimitError::RateLimited { limit, remaining, retry_after, .. } => Some(Self {
                limit: *limit,
                remaining: *remaining,
                reset_unix_secs: unix_secs_ceil(now + *retry_after),
                retry_after_secs: Some(secs_ceil(*retry_after)),
            }),
            RateLimitError::UnsupportedOperation { .. } => None,
        }
    }

    /// Name/value pairs, `Retry-After` first when present.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);
        if let Some(secs) = self.retry_after_secs {
            pairs.push((RETRY_AFTER, secs.to_string()));
        }
        pairs.push((X_RATELIMIT_LIMIT, self.limit.to_string()));
        pairs.push((X_RATELIMIT_REMAINING, self.remaining.to_string()));
        pairs.push((X_RATELIMIT_RESET, self.reset_unix_secs.to_string()));
        pairs
    }
}

fn secs_ceil(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

fn unix_secs_ceil(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(secs_ceil).unwrap_or(0)
}
