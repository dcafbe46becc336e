//! Convenient re-exports for common ratescope types.
pub use crate::{
    bucket::{BucketDecision, TokenBucket},
    clock::{Clock, ManualClock, MonotonicClock},
    config::{ConfigError, Interval, LimitConfig, Scope},
    error::{GuardError, RateLimitError},
    headers::RateLimitHeaders,
    middleware::{Admitted, KeyExtractor, NoKey, RateLimitLayer},
    policy::RateLimitPolicy,
    presets,
    registry::{Admission, RateLimiterRegistry},
};
