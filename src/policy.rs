//! Async guard for discrete user-initiated actions (bot commands, jobs).

use crate::error::{GuardError, RateLimitError};
use crate::registry::RateLimiterRegistry;
use std::future::Future;
use std::sync::Arc;

/// Runs operations only when a [`RateLimiterRegistry`] admits them.
///
/// Clones share the same registry, so every handle draws from the same buckets.
/// Rejections are returned to the caller as [`GuardError::Limited`] and logged at
/// `debug`; they are never retried here.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    registry: Arc<RateLimiterRegistry>,
    name: Arc<str>,
}

impl RateLimitPolicy {
    /// Wrap a registry.
    pub fn new(registry: RateLimiterRegistry) -> Self {
        Self::from_shared(Arc::new(registry))
    }

    /// Wrap a registry that is also used elsewhere.
    pub fn from_shared(registry: Arc<RateLimiterRegistry>) -> Self {
        Self { registry, name: Arc::from("rate_limit") }
    }

    /// Label used in log records (e.g. the command name).
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// The label given by [`with_name`](Self::with_name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<RateLimiterRegistry> {
        &self.registry
    }

    /// Consume one unit for `key`, then run `operation`.
    ///
    /// # Errors
    /// Returns `GuardError::Limited` without running `operation` if the limit is
    /// exhausted, or `GuardError::Inner(E)` if the operation itself fails.
    ///
    /// # Examples
    /// ```
    /// use ratescope::{Interval, RateLimitPolicy, RateLimiterRegistry};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let policy = RateLimitPolicy::new(RateLimiterRegistry::per_key(1, Interval::Hour).unwrap());
    ///     let ok = policy.execute(Some("u1"), || async { Ok::<_, std::io::Error>("pong") }).await;
    ///     assert_eq!(ok.unwrap(), "pong");
    ///     let err = policy.execute(Some("u1"), || async { Ok::<_, std::io::Error>("pong") }).await;
    ///     assert!(err.unwrap_err().is_rate_limited());
    /// }
    /// ```
    pub async fn execute<T, E, Fut, Op>(
        &self,
        key: Option<&str>,
        operation: Op,
    ) -> Result<T, GuardError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        self.admit(key)?;
        operation().await.map_err(GuardError::Inner)
    }

    /// Consume one unit for `key` without running anything.
    pub fn admit(&self, key: Option<&str>) -> Result<(), RateLimitError> {
        match self.registry.consume(key) {
            Ok(_) => Ok(()),
            Err(err) => {
                if let RateLimitError::RateLimited { scope, retry_after, .. } = &err {
                    tracing::debug!(
                        target: "ratescope::policy",
                        policy = %self.name,
                        key = key.unwrap_or("-"),
                        scope = %scope,
                        retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                        "rate limited"
                    );
                }
                Err(err)
            }
        }
    }
}

impl From<RateLimiterRegistry> for RateLimitPolicy {
    fn from(registry: RateLimiterRegistry) -> Self {
        Self::new(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{Interval, LimitConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    fn policy(cfg: LimitConfig) -> (RateLimitPolicy, ManualClock) {
        let clock = ManualClock::new();
        let registry = RateLimiterRegistry::with_clock(cfg, clock.clone()).expect("valid config");
        (RateLimitPolicy::new(registry).with_name("lfg"), clock)
    }

    #[tokio::test]
    async fn runs_operation_when_admitted() {
        let (policy, _clock) = policy(LimitConfig::per_key(2, Interval::Hour));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = counter.clone();
            let result = policy
                .execute(Some("u1"), || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(42)
                })
                .await;
            assert_eq!(result.unwrap(), 42);
        }

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn skips_operation_when_limited() {
        let (policy, _clock) = policy(LimitConfig::per_key(1, Interval::Hour));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            let _ = policy
                .execute(Some("u1"), || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(())
                })
                .await;
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let err = policy.execute(Some("u1"), || async { Ok::<_, TestError>(()) }).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Interval::Hour.as_duration()));
        assert!(err.as_limited().unwrap().user_message().unwrap().contains("slow down"));
    }

    #[tokio::test]
    async fn propagates_operation_errors() {
        let (policy, _clock) = policy(LimitConfig::shared(5, Interval::Second));
        let result = policy
            .execute(None, || async { Err::<(), _>(TestError("operation failed".into())) })
            .await;

        match result.unwrap_err() {
            GuardError::Inner(e) => assert_eq!(e.0, "operation failed"),
            e => panic!("Expected Inner error, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn clones_share_buckets() {
        let (policy, clock) = policy(LimitConfig::shared(1, Interval::Second));
        let other = policy.clone();
        assert!(policy.admit(None).is_ok());
        assert!(other.admit(None).unwrap_err().is_rate_limited());
        clock.advance(1_000);
        assert!(other.admit(None).is_ok());
        assert_eq!(other.name(), "lfg");
    }
}
