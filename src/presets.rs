//! Ready-made limit configurations for common call sites.
//!
//! Every preset returns a [`LimitConfig`], so callers can still pick a clock
//! (`RateLimiterRegistry::with_clock`) or tweak key bounds before building.
//!
//! ## Available Presets
//!
//! - [`interaction_throughput`]: whole-process cap on incoming bot interactions (5000/s, shared)
//! - [`per_user_commands`]: per-user cap for a single bot command
//! - [`per_client_requests`]: per-IP cap for an HTTP route
//!
//! ```rust
//! use ratescope::{presets, Interval, RateLimiterRegistry, Scope};
//!
//! let interactions = RateLimiterRegistry::new(presets::interaction_throughput()).unwrap();
//! assert_eq!(interactions.scope(), Scope::Shared);
//!
//! let lfg = RateLimiterRegistry::new(presets::per_user_commands(8, Interval::Hour)).unwrap();
//! assert!(lfg.consume(Some("user-1")).is_ok());
//! ```

use crate::config::{Interval, LimitConfig, DEFAULT_MAX_KEYS};
use std::time::Duration;

const INTERACTIONS_PER_SECOND: u32 = 5000;
const DEFAULT_CLIENT_KEYS: usize = 4096;

/// Shared cap on incoming interactions across every user: 5000 per second.
///
/// Meant to sit in front of command dispatch so a flood of interactions
/// cannot starve the process.
pub fn interaction_throughput() -> LimitConfig {
    LimitConfig::shared(INTERACTIONS_PER_SECOND, Interval::Second)
}

/// Per-user cap for one command, e.g. `per_user_commands(4, Interval::Hour)` for writes
/// and `per_user_commands(10, Interval::Minute)` for reads.
///
/// Tracks at most 512 users at once; the least recently active user's bucket is
/// dropped first.
pub fn per_user_commands(capacity: u32, interval: impl Into<Duration>) -> LimitConfig {
    LimitConfig::per_key(capacity, interval).with_max_keys(DEFAULT_MAX_KEYS)
}

/// Per-client cap for an HTTP route, keyed by client address.
///
/// Keeps more keys than the command presets since address churn is higher.
pub fn per_client_requests(capacity: u32, interval: impl Into<Duration>) -> LimitConfig {
    LimitConfig::per_key(capacity, interval).with_max_keys(DEFAULT_CLIENT_KEYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scope;

    #[test]
    fn presets_are_valid() {
        for cfg in [
            interaction_throughput(),
            per_user_commands(8, Interval::Hour),
            per_user_commands(10, Interval::Minute),
            per_client_requests(100, Interval::Minute),
        ] {
            assert!(cfg.validate().is_ok(), "{cfg:?}");
        }
    }

    #[test]
    fn interaction_throughput_is_shared() {
        let cfg = interaction_throughput();
        assert_eq!(cfg.scope(), Scope::Shared);
        assert_eq!(cfg.capacity(), 5000);
        assert_eq!(cfg.interval(), Duration::from_secs(1));
    }

    #[test]
    fn per_key_presets_bound_keys() {
        assert_eq!(per_user_commands(4, Interval::Hour).max_keys(), 512);
        assert_eq!(per_client_requests(4, Interval::Hour).max_keys(), 4096);
        assert_eq!(per_client_requests(4, Interval::Hour).scope(), Scope::PerKey);
    }
}
