//! Denial responses.
//!
//! # Responsibilities
//! - Render gate denials as JSON bodies with the matching status
//! - Attach rate-limit headers to 429 responses
//!
//! # Design Decisions
//! - Bodies never say which internal check failed beyond the denial message
//! - `X-RateLimit-Reset` and the body's `resetTime` are both epoch seconds

use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use crate::error::GateError;
use crate::security::{Denial, DenialKind};

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";
pub const X_RESPONSE_TIME: &str = "x-response-time";

fn epoch_secs_ceil(ms: i64) -> i64 {
    (ms + 999).div_euclid(1000)
}

/// Build the client-facing response for `denial`.
pub fn denial_response(denial: &Denial, now: DateTime<Utc>) -> Result<Response<Body>, GateError> {
    let status = StatusCode::from_u16(denial.kind.status()).unwrap_or(StatusCode::FORBIDDEN);
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json");

    let body = match (denial.kind, &denial.rate_limit) {
        (DenialKind::RateLimited, Some(decision)) => {
            let reset = epoch_secs_ceil(decision.reset_time);
            builder = builder
                .header(X_RATELIMIT_LIMIT, decision.limit)
                .header(X_RATELIMIT_REMAINING, decision.remaining)
                .header(X_RATELIMIT_RESET, reset);
            if let Some(retry_after) = decision.retry_after_secs {
                builder = builder.header(header::RETRY_AFTER, retry_after);
            }
            json!({
                "error": denial.kind.title(),
                "message": denial.message,
                "limit": decision.limit,
                "remaining": decision.remaining,
                "resetTime": reset,
            })
        }
        _ => json!({
            "error": denial.kind.title(),
            "message": denial.message,
            "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
    };

    Ok(builder.body(Body::from(body.to_string()))?)
}
