use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ratescope::{Interval, LimitConfig, RateLimitLayer, RateLimiterRegistry};

use futures::future::Ready;
use std::sync::Arc;
use tower::{Service, ServiceBuilder};

// A simple service that just returns its input.
#[derive(Clone)]
struct EchoService;

impl Service<&'static str> for EchoService {
    type Response = &'static str;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: &'static str) -> Self::Future {
        futures::future::ready(Ok(req))
    }
}

fn shared_consume(c: &mut Criterion) {
    let limiter = RateLimiterRegistry::shared(u32::MAX / 2, Interval::Second).unwrap();
    c.bench_function("shared_consume", |b| {
        b.iter(|| {
            let _ = black_box(limiter.consume(black_box(None)));
        });
    });
}

fn per_key_consume_hot_key(c: &mut Criterion) {
    let limiter = RateLimiterRegistry::per_key(u32::MAX / 2, Interval::Second).unwrap();
    c.bench_function("per_key_consume_hot_key", |b| {
        b.iter(|| {
            let _ = black_box(limiter.consume(black_box(Some("user-1"))));
        });
    });
}

fn per_key_consume_churn(c: &mut Criterion) {
    // More distinct keys than slots, so most calls create a bucket and evict one.
    let limiter =
        RateLimiterRegistry::new(LimitConfig::per_key(10, Interval::Minute).with_max_keys(256))
            .unwrap();
    let keys: Vec<String> = (0..1024).map(|i| format!("user-{i}")).collect();
    let mut next = 0usize;
    c.bench_function("per_key_consume_churn", |b| {
        b.iter(|| {
            let key = &keys[next % keys.len()];
            next = next.wrapping_add(1);
            let _ = black_box(limiter.consume(Some(key)));
        });
    });
}

fn middleware_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry =
        Arc::new(RateLimiterRegistry::shared(u32::MAX / 2, Interval::Second).unwrap());
    let svc = ServiceBuilder::new().layer(RateLimitLayer::new(registry)).service(EchoService);

    c.bench_function("middleware_admitted", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let _ = black_box(local_svc.call(black_box("request"))).await;
        });
    });
}

criterion_group!(
    benches,
    shared_consume,
    per_key_consume_hot_key,
    per_key_consume_churn,
    middleware_throughput
);
criterion_main!(benches);
