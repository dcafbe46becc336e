//! Token bucket with lazy, timer-free refill.
//!
//! Tokens are kept in fixed point: one token is `interval_ms` units and every
//! elapsed millisecond adds `capacity` units. Refill is therefore exact integer
//! arithmetic and a bucket of capacity `C` over interval `I` regains precisely
//! one token every `I / C` milliseconds.

use crate::clock::{Clock, MonotonicClock};
use crate::config::{check_bucket, ConfigError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of a single [`TokenBucket::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketDecision {
    /// Tokens were taken.
    Allowed {
        /// Whole tokens left after this acquisition.
        remaining: u32,
        /// Time until the bucket is full again.
        reset_after: Duration,
    },
    /// Not enough tokens; nothing was taken.
    Denied {
        /// Whole tokens currently available.
        remaining: u32,
        /// Time until enough tokens accrue for the same request.
        retry_after: Duration,
    },
    /// More units than the capacity were requested. No amount of waiting admits
    /// such a request, so there is no retry hint.
    Oversized {
        /// Whole tokens currently available.
        remaining: u32,
    },
}

impl BucketDecision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, BucketDecision::Allowed { .. })
    }

    /// Whole tokens left, whichever way the decision went.
    pub fn remaining(&self) -> u32 {
        match self {
            BucketDecision::Allowed { remaining, .. }
            | BucketDecision::Denied { remaining, .. }
            | BucketDecision::Oversized { remaining } => *remaining,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill_ms: u64,
}

/// A rolling-window token bucket.
///
/// Starts full ("fire immediately"), so the first `capacity` requests in a
/// window are admitted without delay. Refill and consumption happen under a
/// single lock acquisition, so concurrent callers never both spend the same
/// token.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    interval_ms: u64,
    capacity_scaled: u64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// Create a full bucket on the monotonic clock.
    ///
    /// Errors if `capacity` is zero, `interval` is shorter than a millisecond, or
    /// `capacity * interval_ms` overflows.
    ///
    /// # Examples
    /// ```
    /// use ratescope::TokenBucket;
    /// use std::time::Duration;
    /// let bucket = TokenBucket::new(2, Duration::from_secs(1)).unwrap();
    /// assert!(bucket.try_consume(1));
    /// assert!(bucket.try_consume(1));
    /// assert!(!bucket.try_consume(1));
    /// ```
    pub fn new(capacity: u32, interval: Duration) -> Result<Self, ConfigError> {
        Self::with_shared_clock(capacity, interval, Arc::new(MonotonicClock::default()))
    }

    /// Override the clock (useful for deterministic tests). Refills the bucket.
    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let state = Mutex::new(BucketState {
            tokens: self.capacity_scaled,
            last_refill_ms: clock.now_millis(),
        });
        Self { state, clock, ..self }
    }

    pub(crate) fn with_shared_clock(
        capacity: u32,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let interval_ms = check_bucket(capacity, interval)?;
        Ok(Self::prevalidated(capacity, interval_ms, clock))
    }

    /// Build from parameters that already passed [`check_bucket`].
    pub(crate) fn prevalidated(capacity: u32, interval_ms: u64, clock: Arc<dyn Clock>) -> Self {
        let capacity_scaled = u64::from(capacity) * interval_ms;
        let state =
            Mutex::new(BucketState { tokens: capacity_scaled, last_refill_ms: clock.now_millis() });
        Self { capacity, interval_ms, capacity_scaled, state, clock }
    }

    /// Maximum tokens per window.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Window length.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Take `units` tokens if they are all available; never takes a partial amount.
    pub fn try_consume(&self, units: u32) -> bool {
        self.acquire(units).is_allowed()
    }

    /// Like [`try_consume`](Self::try_consume), reporting what is left and how long to wait.
    ///
    /// Requests larger than the capacity yield [`BucketDecision::Oversized`].
    pub fn acquire(&self, units: u32) -> BucketDecision {
        let mut state = self.lock();
        self.refill(&mut state);

        if units > self.capacity {
            return BucketDecision::Oversized { remaining: self.whole_tokens(state.tokens) };
        }

        let cost = u128::from(units) * u128::from(self.interval_ms);
        let tokens = u128::from(state.tokens);

        if tokens >= cost {
            // cost <= tokens <= capacity_scaled, so it fits in u64
            state.tokens -= cost as u64;
            BucketDecision::Allowed {
                remaining: self.whole_tokens(state.tokens),
                reset_after: self.millis_to_accrue(u128::from(self.capacity_scaled - state.tokens)),
            }
        } else {
            BucketDecision::Denied {
                remaining: self.whole_tokens(state.tokens),
                retry_after: self.millis_to_accrue(cost - tokens),
            }
        }
    }

    /// Whole tokens available right now.
    pub fn remaining(&self) -> u32 {
        let mut state = self.lock();
        self.refill(&mut state);
        self.whole_tokens(state.tokens)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        self.state.lock().expect("token bucket state poisoned")
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now_millis();
        // A clock that steps backwards yields no tokens and does not move the mark.
        if now <= state.last_refill_ms {
            return;
        }
        let elapsed = now - state.last_refill_ms;
        let accrued = elapsed.saturating_mul(u64::from(self.capacity));
        state.tokens = state.tokens.saturating_add(accrued).min(self.capacity_scaled);
        state.last_refill_ms = now;
    }

    fn whole_tokens(&self, scaled: u64) -> u32 {
        // scaled <= capacity * interval_ms, so the quotient fits in u32
        (scaled / self.interval_ms) as u32
    }

    fn millis_to_accrue(&self, missing: u128) -> Duration {
        let per_ms = u128::from(self.capacity);
        let millis = missing.div_ceil(per_ms);
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}
