#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # ratescope
//!
//! Scoped token-bucket rate limiting for bots and services.
//!
//! ## Features
//!
//! - **Token buckets** with lazy, timer-free refill and exact integer arithmetic
//! - **Shared scope**: one bucket for the whole process
//! - **Per-key scope**: one bucket per user/IP, bounded by an LRU cache
//! - **Typed rejections** carrying a retry hint and a user-facing message
//! - **Async guard** for commands and **tower middleware** for request handlers
//!
//! ## Quick Start
//!
//! ```rust
//! use ratescope::{Interval, LimitConfig, RateLimiterRegistry};
//!
//! let limiter = RateLimiterRegistry::new(LimitConfig::per_key(4, Interval::Minute)).unwrap();
//!
//! for _ in 0..4 {
//!     limiter.consume(Some("u1")).unwrap();
//! }
//! let rejected = limiter.consume(Some("u1")).unwrap_err();
//! assert_eq!(rejected.retry_after(), Some(std::time::Duration::from_secs(15)));
//! assert!(limiter.consume(Some("u2")).is_ok());
//! ```

pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod headers;
pub mod lru;
pub mod middleware;
pub mod policy;
pub mod prelude;
pub mod presets;
pub mod registry;

// Re-exports
pub use bucket::{BucketDecision, TokenBucket};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, Interval, LimitConfig, Scope};
pub use error::{GuardError, RateLimitError};
pub use headers::RateLimitHeaders;
pub use middleware::{Admitted, KeyExtractor, NoKey, RateLimitLayer, RateLimitService};
pub use policy::RateLimitPolicy;
pub use registry::{Admission, RateLimiterRegistry};
