//! Registry routing `consume` calls to the right token bucket for one limit policy.
//!
//! A [`RateLimiterRegistry`] is built once per rate-limited operation (a
//! command, an event pipeline, an HTTP route) and owned by whoever guards that
//! operation. Shared registries hold a single bucket; per-key registries hold a
//! bounded LRU of buckets, created lazily on first use of a key.
//!
//! ```
//! use ratescope::{Interval, LimitConfig, RateLimiterRegistry};
//!
//! let limiter = RateLimiterRegistry::new(LimitConfig::per_key(4, Interval::Hour)).unwrap();
//! for _ in 0..4 {
//!     assert!(limiter.consume(Some("u1")).is_ok());
//! }
//! let err = limiter.consume(Some("u1")).unwrap_err();
//! assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(15 * 60)));
//! assert!(limiter.consume(Some("u2")).is_ok());
//! ```

use crate::bucket::{BucketDecision, TokenBucket};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{check_bucket, ConfigError, LimitConfig, Scope};
use crate::error::RateLimitError;
use crate::lru::LruCache;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A successful `consume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Scope of the bucket that admitted the call.
    pub scope: Scope,
    /// Tokens per window of the bucket used.
    pub limit: u32,
    /// Whole tokens left in that bucket.
    pub remaining: u32,
    /// Time until that bucket is full again.
    pub reset_after: Duration,
}

#[derive(Debug)]
enum Buckets {
    Shared(Arc<TokenBucket>),
    PerKey { unkeyed: Arc<TokenBucket>, keyed: Mutex<LruCache<String, Arc<TokenBucket>>> },
}

/// Owns the bucket(s) for one rate-limit policy.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    config: LimitConfig,
    interval_ms: u64,
    clock: Arc<dyn Clock>,
    buckets: Buckets,
}

impl RateLimiterRegistry {
    /// Build a registry on the monotonic clock.
    pub fn new(config: LimitConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, MonotonicClock::default())
    }

    /// Build a registry on a custom clock (useful for deterministic tests).
    ///
    /// # Example
    /// ```
    /// use ratescope::{LimitConfig, ManualClock, RateLimiterRegistry};
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::new();
    /// let limiter = RateLimiterRegistry::with_clock(
    ///     LimitConfig::shared(1, Duration::from_secs(1)),
    ///     clock.clone(),
    /// )
    /// .unwrap();
    /// assert!(limiter.consume(None).is_ok());
    /// assert!(limiter.consume(None).is_err());
    /// clock.advance(1_000);
    /// assert!(limiter.consume(None).is_ok());
    /// ```
    pub fn with_clock<C: Clock + 'static>(config: LimitConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let interval_ms = check_bucket(config.capacity(), config.interval())?;

        let buckets = match config.scope() {
            Scope::Shared => Buckets::Shared(Arc::new(TokenBucket::prevalidated(
                config.capacity(),
                interval_ms,
                clock.clone(),
            ))),
            Scope::PerKey => Buckets::PerKey {
                unkeyed: Arc::new(TokenBucket::prevalidated(
                    config.unkeyed_capacity(),
                    interval_ms,
                    clock.clone(),
                )),
                keyed: Mutex::new(LruCache::new(config.max_keys())),
            },
        };

        Ok(Self { config, interval_ms, clock, buckets })
    }

    /// Shorthand for a shared registry.
    pub fn shared(capacity: u32, interval: impl Into<Duration>) -> Result<Self, ConfigError> {
        Self::new(LimitConfig::shared(capacity, interval))
    }

    /// Shorthand for a per-key registry with default key bounds.
    pub fn per_key(capacity: u32, interval: impl Into<Duration>) -> Result<Self, ConfigError> {
        Self::new(LimitConfig::per_key(capacity, interval))
    }

    /// Configuration this registry was built from.
    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    /// Shared or per-key.
    pub fn scope(&self) -> Scope {
        self.config.scope()
    }

    /// Eagerly create the bucket for `key`.
    ///
    /// Idempotent: an existing bucket keeps its tokens (it only becomes most
    /// recently used). Fails with `UnsupportedOperation` on shared registries
    /// without touching any state.
    ///
    /// The empty key means "no key" and is served by the unkeyed bucket, so
    /// registering it creates nothing.
    pub fn register_key(&self, key: &str) -> Result<(), RateLimitError> {
        let mut keyed = self.keyed("register_key")?;
        if !key.is_empty() {
            let _ = keyed.get_or_insert_with(key, || self.new_keyed_bucket());
        }
        Ok(())
    }

    /// Admit one unit of work for `key`.
    ///
    /// Shared registries, and key-less calls on per-key registries, use the
    /// registry-wide bucket; an empty key counts as no key. Keys that were never
    /// registered get a fresh bucket on first use.
    ///
    /// Outcomes report the scope of the bucket that decided: the unkeyed bucket
    /// of a per-key registry is shared by every key-less caller, so it reports
    /// [`Scope::Shared`].
    pub fn consume(&self, key: Option<&str>) -> Result<Admission, RateLimitError> {
        let (bucket, scope) = self.resolve(key);
        match bucket.acquire(1) {
            BucketDecision::Allowed { remaining, reset_after } => Ok(Admission {
                scope,
                limit: bucket.capacity(),
                remaining,
                reset_after,
            }),
            BucketDecision::Denied { remaining, retry_after } => Err(RateLimitError::RateLimited {
                scope,
                limit: bucket.capacity(),
                remaining,
                retry_after,
            }),
            // validated capacities are at least one
            BucketDecision::Oversized { .. } => unreachable!("a single unit never exceeds capacity"),
        }
    }

    /// Whole tokens `key` could spend right now, without creating or refreshing anything.
    pub fn remaining(&self, key: Option<&str>) -> u32 {
        match (&self.buckets, non_empty(key)) {
            (Buckets::Shared(bucket), _) | (Buckets::PerKey { unkeyed: bucket, .. }, None) => {
                bucket.remaining()
            }
            (Buckets::PerKey { keyed, .. }, Some(key)) => {
                let bucket = lock(keyed).peek(key).cloned();
                bucket.map_or(self.config.capacity(), |b| b.remaining())
            }
        }
    }

    /// Drop the bucket for `key`; its next use starts with full capacity.
    ///
    /// Returns whether a bucket existed.
    pub fn forget(&self, key: &str) -> Result<bool, RateLimitError> {
        Ok(self.keyed("forget")?.remove(key).is_some())
    }

    /// Whether `key` currently has a live bucket. Does not count as a use.
    pub fn contains_key(&self, key: &str) -> bool {
        match &self.buckets {
            Buckets::Shared(_) => false,
            Buckets::PerKey { keyed, .. } => lock(keyed).contains_key(key),
        }
    }

    /// Number of live keyed buckets (always zero for shared registries).
    pub fn len(&self) -> usize {
        match &self.buckets {
            Buckets::Shared(_) => 0,
            Buckets::PerKey { keyed, .. } => lock(keyed).len(),
        }
    }

    /// True when no keyed bucket is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, key: Option<&str>) -> (Arc<TokenBucket>, Scope) {
        match (&self.buckets, non_empty(key)) {
            (Buckets::Shared(bucket), _) | (Buckets::PerKey { unkeyed: bucket, .. }, None) => {
                (bucket.clone(), Scope::Shared)
            }
            (Buckets::PerKey { keyed, .. }, Some(key)) => {
                // Release the cache before touching the bucket; an entry evicted
                // meanwhile stays valid for this call through its Arc.
                let mut keyed = lock(keyed);
                let (bucket, _evicted) = keyed.get_or_insert_with(key, || self.new_keyed_bucket());
                (bucket.clone(), Scope::PerKey)
            }
        }
    }

    fn keyed(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, LruCache<String, Arc<TokenBucket>>>, RateLimitError> {
        match &self.buckets {
            Buckets::PerKey { keyed, .. } => Ok(lock(keyed)),
            Buckets::Shared(_) => {
                Err(RateLimitError::UnsupportedOperation { operation, scope: Scope::Shared })
            }
        }
    }

    fn new_keyed_bucket(&self) -> Arc<TokenBucket> {
        Arc::new(TokenBucket::prevalidated(self.config.capacity(), self.interval_ms, self.clock.clone()))
    }
}

fn non_empty(key: Option<&str>) -> Option<&str> {
    key.filter(|k| !k.is_empty())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("rate limiter key cache poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Interval;

    fn per_key(capacity: u32, max_keys: usize) -> (RateLimiterRegistry, ManualClock) {
        let clock = ManualClock::new();
        let cfg = LimitConfig::per_key(capacity, Interval::Minute).with_max_keys(max_keys);
        (RateLimiterRegistry::with_clock(cfg, clock.clone()).expect("valid config"), clock)
    }

    #[test]
    fn rejects_invalid_config() {
        let err = RateLimiterRegistry::per_key(0, Interval::Second).unwrap_err();
        assert_eq!(err, ConfigError::ZeroCapacity);
    }

    #[test]
    fn shared_registry_refuses_key_operations_without_mutation() {
        let limiter = RateLimiterRegistry::shared(2, Interval::Second).unwrap();
        let err = limiter.register_key("a").unwrap_err();
        assert_eq!(
            err,
            RateLimitError::UnsupportedOperation { operation: "register_key", scope: Scope::Shared }
        );
        assert!(limiter.forget("a").unwrap_err().is_unsupported());
        assert_eq!(limiter.len(), 0);
        assert!(!limiter.contains_key("a"));
        assert_eq!(limiter.remaining(None), 2);
    }

    #[test]
    fn register_key_is_idempotent() {
        let (limiter, _clock) = per_key(3, 8);
        limiter.register_key("a").unwrap();
        limiter.consume(Some("a")).unwrap();
        limiter.consume(Some("a")).unwrap();
        limiter.register_key("a").unwrap();
        assert_eq!(limiter.remaining(Some("a")), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn unknown_key_is_created_on_first_consume() {
        let (limiter, _clock) = per_key(2, 8);
        assert!(!limiter.contains_key("fresh"));
        let admission = limiter.consume(Some("fresh")).unwrap();
        assert_eq!(admission.remaining, 1);
        assert_eq!(admission.limit, 2);
        assert_eq!(admission.scope, Scope::PerKey);
        assert!(limiter.contains_key("fresh"));
    }

    #[test]
    fn remaining_for_unknown_key_reports_capacity_without_creating() {
        let (limiter, _clock) = per_key(5, 8);
        assert_eq!(limiter.remaining(Some("ghost")), 5);
        assert!(limiter.is_empty());
    }

    #[test]
    fn keyless_calls_on_per_key_registry_use_unkeyed_bucket() {
        let clock = ManualClock::new();
        let cfg = LimitConfig::per_key(1, Interval::Minute).with_unkeyed_capacity(2);
        let limiter = RateLimiterRegistry::with_clock(cfg, clock).unwrap();

        assert_eq!(limiter.consume(None).unwrap().limit, 2);
        assert!(limiter.consume(None).is_ok());
        let err = limiter.consume(None).unwrap_err();
        assert_eq!(err.scope(), Scope::Shared);
        assert_eq!(err.user_message(), Some(crate::error::SHARED_LIMIT_MESSAGE));
        let admission = limiter.consume(Some("a")).unwrap();
        assert_eq!(admission.scope, Scope::PerKey);
        assert!(!limiter.is_empty());
    }

    #[test]
    fn empty_key_counts_as_no_key() {
        let clock = ManualClock::new();
        let cfg = LimitConfig::per_key(1, Interval::Minute).with_unkeyed_capacity(3);
        let limiter = RateLimiterRegistry::with_clock(cfg, clock).unwrap();

        let admission = limiter.consume(Some("")).unwrap();
        assert_eq!(admission.limit, 3);
        assert_eq!(admission.scope, Scope::Shared);
        assert_eq!(limiter.remaining(None), 2);
        assert_eq!(limiter.remaining(Some("")), 2);

        limiter.register_key("").unwrap();
        assert!(limiter.is_empty());
        assert!(!limiter.contains_key(""));
        assert!(!limiter.forget("").unwrap());
    }

    #[test]
    fn forget_resets_a_key() {
        let (limiter, _clock) = per_key(1, 8);
        limiter.consume(Some("a")).unwrap();
        assert!(limiter.consume(Some("a")).is_err());
        assert!(limiter.forget("a").unwrap());
        assert!(!limiter.forget("a").unwrap());
        assert!(limiter.consume(Some("a")).is_ok());
    }

    #[test]
    fn consume_refreshes_recency() {
        let (limiter, _clock) = per_key(1, 2);
        limiter.consume(Some("a")).unwrap();
        limiter.consume(Some("b")).unwrap();
        // "a" becomes most recently used even though it is rejected
        assert!(limiter.consume(Some("a")).is_err());
        limiter.consume(Some("c")).unwrap();
        assert!(limiter.contains_key("a"));
        assert!(!limiter.contains_key("b"));
    }
}
