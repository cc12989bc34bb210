//! Axum middleware that puts the security gate in front of the application.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::clock::Clock;
use crate::context::GateContext;
use crate::http::request::request_info;
use crate::http::response::{denial_response, X_RESPONSE_TIME};
use crate::security::headers::apply_security_headers;
use crate::security::Verdict;

pub async fn security_gate_middleware(
    State(ctx): State<Arc<GateContext>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let info = request_info(&request);

    let response = match ctx.gate.evaluate(&info) {
        Verdict::Allow => pass_through(&ctx, request, next, started).await,
        Verdict::Deny(denial) => {
            tracing::debug!(
                ip = %info.ip,
                method = %info.method,
                path = %info.path,
                reason = denial.reason,
                "Request denied"
            );
            match denial_response(&denial, ctx.clock.now()) {
                Ok(response) => response,
                Err(e) => {
                    ctx.gate.record_failure(&info, &e);
                    pass_through(&ctx, request, next, started).await
                }
            }
        }
    };

    let response_size = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    ctx.gate
        .record_outcome(&info, response.status().as_u16(), started.elapsed(), response_size);

    response
}

async fn pass_through(ctx: &GateContext, request: Request<Body>, next: Next, started: Instant) -> Response {
    let mut response = next.run(request).await;
    let policy = ctx.gate.policy();
    apply_security_headers(response.headers_mut(), policy.security_headers());

    let elapsed = format!("{}ms", started.elapsed().as_millis());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert(X_RESPONSE_TIME, value);
    }
    response
}
