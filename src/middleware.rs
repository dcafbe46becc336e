//! Tower middleware that admits requests through a [`RateLimiterRegistry`].
//!
//! The layer asks a [`KeyExtractor`] for the caller identity (for example the
//! client address), consumes one unit and either forwards the request or fails
//! it with [`GuardError::Limited`]. Admitted responses come back wrapped in
//! [`Admitted`] so the handler can still report the limit state on success.
//! Turning either outcome into HTTP headers (see [`RateLimitHeaders`]) and a
//! `429 Too Many Requests` status is left to the server framework.

use crate::error::{GuardError, RateLimitError};
use crate::headers::RateLimitHeaders;
use crate::registry::{Admission, RateLimiterRegistry};
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;
use tower_layer::Layer;
use tower_service::Service;

/// Derives the rate-limit key of a request. `None` means "use the shared bucket".
pub trait KeyExtractor<Req>: Send + Sync {
    /// Identity to limit `req` by.
    fn extract(&self, req: &Req) -> Option<String>;
}

impl<Req, F> KeyExtractor<Req> for F
where
    F: Fn(&Req) -> Option<String> + Send + Sync,
{
    fn extract(&self, req: &Req) -> Option<String> {
        self(req)
    }
}

/// Extractor that never yields a key: every request hits the shared bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKey;

impl<Req> KeyExtractor<Req> for NoKey {
    fn extract(&self, _req: &Req) -> Option<String> {
        None
    }
}

/// A layer that enforces rate limits using a [`RateLimiterRegistry`].
#[derive(Debug)]
pub struct RateLimitLayer<X> {
    registry: Arc<RateLimiterRegistry>,
    extractor: Arc<X>,
}

impl<X> Clone for RateLimitLayer<X> {
    fn clone(&self) -> Self {
        Self { registry: self.registry.clone(), extractor: self.extractor.clone() }
    }
}

impl RateLimitLayer<NoKey> {
    /// Limit every request against the registry's shared bucket.
    pub fn new(registry: Arc<RateLimiterRegistry>) -> Self {
        Self { registry, extractor: Arc::new(NoKey) }
    }
}

impl<X> RateLimitLayer<X> {
    /// Limit each request by the key `extractor` derives from it.
    pub fn keyed(registry: Arc<RateLimiterRegistry>, extractor: X) -> Self {
        Self { registry, extractor: Arc::new(extractor) }
    }
}

impl<S, X> Layer<S> for RateLimitLayer<X> {
    type Service = RateLimitService<S, X>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            registry: self.registry.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

/// Middleware service that enforces rate limits.
#[derive(Debug)]
pub struct RateLimitService<S, X> {
    inner: S,
    registry: Arc<RateLimiterRegistry>,
    extractor: Arc<X>,
}

impl<S: Clone, X> Clone for RateLimitService<S, X> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            registry: self.registry.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

impl<S, X> RateLimitService<S, X> {
    /// The registry requests are admitted against.
    pub fn registry(&self) -> &Arc<RateLimiterRegistry> {
        &self.registry
    }
}

/// A response from the inner service together with the admission that let it through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted<T> {
    /// State of the deciding bucket right after this request was admitted.
    pub admission: Admission,
    /// What the inner service returned.
    pub response: T,
}

impl<T> Admitted<T> {
    /// Drop the admission and keep the response.
    pub fn into_inner(self) -> T {
        self.response
    }

    /// `X-RateLimit-*` headers for this response.
    pub fn headers(&self, now: SystemTime) -> RateLimitHeaders {
        RateLimitHeaders::from_admission(&self.admission, now)
    }

    /// Transform the response, keeping the admission.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Admitted<U> {
        Admitted { admission: self.admission, response: f(self.response) }
    }
}

impl<S, X, Req> Service<Req> for RateLimitService<S, X>
where
    S: Service<Req>,
    X: KeyExtractor<Req>,
{
    type Response = Admitted<S::Response>;
    type Error = GuardError<S::Error>;
    type Future = RateLimitFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(GuardError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let key = self.extractor.extract(&req);
        match self.registry.consume(key.as_deref()) {
            Ok(admission) => RateLimitFuture {
                state: State::Inner { future: self.inner.call(req), admission },
            },
            Err(err) => {
                if let RateLimitError::RateLimited { scope, retry_after, .. } = &err {
                    tracing::debug!(
                        target: "ratescope::middleware",
                        key = key.as_deref().unwrap_or("-"),
                        scope = %scope,
                        retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                        "request rate limited"
                    );
                }
                RateLimitFuture { state: State::Limited(Some(err)) }
            }
        }
    }
}

/// Response future of [`RateLimitService`].
#[pin_project]
#[derive(Debug)]
pub struct RateLimitFuture<F> {
    #[pin]
    state: State<F>,
}

#[pin_project(project = StateProj)]
#[derive(Debug)]
enum State<F> {
    Inner {
        #[pin]
        future: F,
        admission: Admission,
    },
    Limited(Option<RateLimitError>),
}

impl<F, T, E> Future for RateLimitFuture<F>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<Admitted<T>, GuardError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().state.project() {
            StateProj::Inner { future, admission } => future.poll(cx).map(|res| match res {
                Ok(response) => Ok(Admitted { admission: *admission, response }),
                Err(err) => Err(GuardError::Inner(err)),
            }),
            StateProj::Limited(err) => match err.take() {
                Some(err) => Poll::Ready(Err(GuardError::Limited(err))),
                None => panic!("RateLimitFuture polled after completion"),
            },
        }
    }
}
