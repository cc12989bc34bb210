use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::context::GateContext;

/// Require `Authorization: Bearer <admin.api_key>`.
pub async fn admin_auth_middleware(
    State(ctx): State<Arc<GateContext>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let policy = ctx.gate.policy();
    let expected = format!("Bearer {}", policy.config.admin.api_key);

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if auth_header == Some(expected.as_str()) {
        return Ok(next.run(request).await);
    }

    tracing::warn!(path = %request.uri().path(), "Rejected admin request with missing or invalid key");
    Err(StatusCode::UNAUTHORIZED)
}
