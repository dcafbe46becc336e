//! Limit configuration: scope, capacity, window and key bounds.
//!
//! A [`LimitConfig`] is fixed once a registry is built; there is no runtime
//! reconfiguration. Enable the `serde` feature to load configs from files.

use std::fmt;
use std::time::Duration;

/// Default bound on live per-key buckets.
pub const DEFAULT_MAX_KEYS: usize = 512;

/// Default capacity of the bucket that serves key-less calls on a per-key registry.
pub const DEFAULT_UNKEYED_CAPACITY: u32 = 1000;

/// Whether a limit is shared by every caller or partitioned per caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Scope {
    /// One bucket for the whole process ("global" / "server").
    #[cfg_attr(feature = "serde", serde(alias = "global", alias = "server"))]
    Shared,
    /// One bucket per caller-supplied key ("local" / "user").
    #[cfg_attr(feature = "serde", serde(alias = "local", alias = "user"))]
    PerKey,
}

impl Scope {
    /// Stable lowercase label, suitable for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Shared => "shared",
            Scope::PerKey => "per_key",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common refill windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Second,
    Minute,
    Hour,
    Day,
}

impl Interval {
    /// Window length.
    pub fn as_duration(self) -> Duration {
        match self {
            Interval::Second => Duration::from_secs(1),
            Interval::Minute => Duration::from_secs(60),
            Interval::Hour => Duration::from_secs(60 * 60),
            Interval::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl From<Interval> for Duration {
    fn from(interval: Interval) -> Self {
        interval.as_duration()
    }
}

/// Errors produced when validating a [`LimitConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Capacity must be > 0.
    #[error("capacity must be > 0")]
    ZeroCapacity,
    /// Interval must be at least one millisecond.
    #[error("interval must be at least 1ms (got {0:?})")]
    IntervalTooShort(Duration),
    /// Per-key registries need room for at least one key.
    #[error("max_keys must be > 0 for per-key limits")]
    ZeroMaxKeys,
    /// Key-less calls on a per-key registry need a non-empty bucket.
    #[error("unkeyed_capacity must be > 0")]
    ZeroUnkeyedCapacity,
    /// `capacity * interval_ms` must fit in a `u64`.
    #[error("capacity {capacity} over {interval:?} overflows the token counter")]
    Overflow {
        /// Capacity provided by caller.
        capacity: u32,
        /// Interval provided by caller.
        interval: Duration,
    },
}

/// Validated limit parameters applied to every bucket of a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimitConfig {
    capacity: u32,
    #[cfg_attr(feature = "serde", serde(rename = "interval_ms", with = "duration_ms"))]
    interval: Duration,
    scope: Scope,
    #[cfg_attr(feature = "serde", serde(default = "default_max_keys"))]
    max_keys: usize,
    #[cfg_attr(feature = "serde", serde(default = "default_unkeyed_capacity"))]
    unkeyed_capacity: u32,
}

impl LimitConfig {
    /// Build a config for the given scope, with default key bounds.
    pub fn new(scope: Scope, capacity: u32, interval: impl Into<Duration>) -> Self {
        Self {
            capacity,
            interval: interval.into(),
            scope,
            max_keys: DEFAULT_MAX_KEYS,
            unkeyed_capacity: DEFAULT_UNKEYED_CAPACITY,
        }
    }

    /// One bucket shared by every caller.
    ///
    /// # Examples
    /// ```
    /// use ratescope::{Interval, LimitConfig, Scope};
    /// let cfg = LimitConfig::shared(5000, Interval::Second);
    /// assert_eq!(cfg.scope(), Scope::Shared);
    /// assert!(cfg.validate().is_ok());
    /// ```
    pub fn shared(capacity: u32, interval: impl Into<Duration>) -> Self {
        Self::new(Scope::Shared, capacity, interval)
    }

    /// One bucket per caller-supplied key.
    pub fn per_key(capacity: u32, interval: impl Into<Duration>) -> Self {
        Self::new(Scope::PerKey, capacity, interval)
    }

    /// Bound the number of live keyed buckets (LRU eviction beyond it).
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    /// Capacity of the bucket serving key-less calls on a per-key registry.
    pub fn with_unkeyed_capacity(mut self, capacity: u32) -> Self {
        self.unkeyed_capacity = capacity;
        self
    }

    /// Tokens per window.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Window length.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Shared or per-key.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Maximum number of live keyed buckets.
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// Capacity of the key-less bucket on per-key registries.
    pub fn unkeyed_capacity(&self) -> u32 {
        self.unkeyed_capacity
    }

    /// Check every parameter; registries refuse to build from an invalid config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_bucket(self.capacity, self.interval)?;
        if self.scope == Scope::PerKey {
            if self.max_keys == 0 {
                return Err(ConfigError::ZeroMaxKeys);
            }
            if self.unkeyed_capacity == 0 {
                return Err(ConfigError::ZeroUnkeyedCapacity);
            }
            check_bucket(self.unkeyed_capacity, self.interval)?;
        }
        Ok(())
    }
}

/// Validate a single bucket's parameters and return the interval in millis.
pub(crate) fn check_bucket(capacity: u32, interval: Duration) -> Result<u64, ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    let interval_ms = u64::try_from(interval.as_millis())
        .map_err(|_| ConfigError::Overflow { capacity, interval })?;
    if interval_ms == 0 {
        return Err(ConfigError::IntervalTooShort(interval));
    }
    u64::from(capacity)
        .checked_mul(interval_ms)
        .ok_or(ConfigError::Overflow { capacity, interval })?;
    Ok(interval_ms)
}

#[cfg(feature = "serde")]
fn default_max_keys() -> usize {
    DEFAULT_MAX_KEYS
}

#[cfg(feature = "serde")]
fn default_unkeyed_capacity() -> u32 {
    DEFAULT_UNKEYED_CAPACITY
}

#[cfg(feature = "serde")]
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
