//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use tower::ServiceExt;

use marketplace_gate::clock::ManualClock;
use marketplace_gate::config::{Environment, GateConfig};
use marketplace_gate::observability::memory::FixedMemory;
use marketplace_gate::{GateContext, HttpServer};

pub const ADMIN_KEY: &str = "test-admin-key";
pub const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64)";
pub const START_MS: i64 = 1_700_000_000_000;

/// A gate wired to a manual clock and a fixed memory reading.
pub struct TestGate {
    pub clock: Arc<ManualClock>,
    pub ctx: Arc<GateContext>,
    pub router: Router,
}

/// Production behaviour with deterministic cleanup and the admin API on.
pub fn production_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.environment = Environment::Production;
    config.rate_limiting.cleanup_probability = 0.0;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config
}

pub fn start_gate(config: GateConfig) -> TestGate {
    let clock = Arc::new(ManualClock::new(START_MS));
    let ctx = Arc::new(
        GateContext::with_parts(config, clock.clone(), Arc::new(FixedMemory(64.0)), None)
            .expect("valid test config"),
    );
    let router = HttpServer::build_router(ctx.clone());
    TestGate { clock, ctx, router }
}

/// A browser-like request from `ip`.
pub fn request(method: &str, path: &str, ip: &str) -> axum::http::request::Builder {
    request_as(method, path, ip, BROWSER_UA)
}

/// A request from `ip` carrying exactly one User-Agent, `user_agent`.
pub fn request_as(method: &str, path: &str, ip: &str, user_agent: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(path)
        .header("x-forwarded-for", ip)
        .header("user-agent", user_agent)
}

pub fn get(path: &str, ip: &str) -> Request<Body> {
    request("GET", path, ip).body(Body::empty()).unwrap()
}

pub fn admin(method: &str, path: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("authorization", format!("Bearer {}", ADMIN_KEY))
        .body(Body::empty())
        .unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
