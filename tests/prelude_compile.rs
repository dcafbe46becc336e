//! Compile-time prelude coverage test.
use ratescope::prelude::*;
use std::sync::Arc;
use tower::service_fn;
use tower_layer::Layer;
use tower_service::Service;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let registry = Arc::new(RateLimiterRegistry::new(presets::interaction_throughput()).unwrap());
    let policy = RateLimitPolicy::from_shared(registry.clone()).with_name("ping");
    policy.execute(None, || async { Ok::<_, std::io::Error>(()) }).await.expect("admitted");

    let mut svc = RateLimitLayer::new(registry)
        .layer(service_fn(|_req: ()| async { Ok::<_, std::io::Error>(()) }));
    svc.call(()).await.expect("service call failed");

    let _cfg: LimitConfig = LimitConfig::per_key(1, Interval::Second);
    let _scope = Scope::PerKey;
    let _clock: ManualClock = ManualClock::new();
}
