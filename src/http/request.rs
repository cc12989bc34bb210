//! Request inspection.
//!
//! # Responsibilities
//! - Resolve the client IP (forwarded chain, real-ip header, peer address)
//! - Collect the headers the gate cares about into a [`RequestInfo`]
//!
//! # Design Decisions
//! - Only the first hop of `x-forwarded-for` is used
//! - Credentials are checked for presence, never parsed
//! - Non-UTF-8 header values are treated as absent

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Request};

use crate::security::RequestInfo;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";
pub const X_USER_ID: &str = "x-user-id";
pub const X_API_KEY: &str = "x-api-key";
pub const X_CSRF_TOKEN: &str = "x-csrf-token";
pub const SESSION_COOKIE: &str = "session";

/// Placeholder when no address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Every User-Agent value, joined. A repeated header cannot hide a signature
/// behind a benign first value.
fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get_all(header::USER_AGENT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Best-effort client address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    header_str(headers, X_FORWARDED_FOR)
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, X_REAL_IP))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

fn has_session_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .any(|(name, value)| name.trim() == SESSION_COOKIE && !value.trim().is_empty())
}

/// Build the gate's view of `request`.
pub fn request_info(request: &Request<Body>) -> RequestInfo {
    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    RequestInfo {
        method: request.method().as_str().to_string(),
        path: request.uri().path().to_string(),
        ip: client_ip(headers, peer),
        user_agent: user_agent(headers),
        user_id: header_str(headers, X_USER_ID).map(str::to_string),
        has_auth_signal: headers.contains_key(header::AUTHORIZATION) || has_session_cookie(headers),
        has_api_credential: header_str(headers, X_API_KEY).is_some()
            || header_str(headers, X_CSRF_TOKEN).is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/api/properties?page=2");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_ip_resolution_order() {
        let req = request(&[(X_FORWARDED_FOR, "203.0.113.9, 10.0.0.1"), (X_REAL_IP, "10.0.0.2")]);
        assert_eq!(request_info(&req).ip, "203.0.113.9");

        let req = request(&[(X_REAL_IP, "10.0.0.2")]);
        assert_eq!(request_info(&req).ip, "10.0.0.2");

        let mut req = request(&[]);
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.7:5555".parse::<SocketAddr>().unwrap()));
        assert_eq!(request_info(&req).ip, "192.0.2.7");

        assert_eq!(request_info(&request(&[])).ip, UNKNOWN_IP);
    }

    #[test]
    fn test_collects_signals() {
        let req = request(&[
            ("user-agent", "Mozilla/5.0"),
            (X_USER_ID, "user-42"),
            ("cookie", "theme=dark; session=abc"),
            (X_CSRF_TOKEN, "t"),
        ]);
        let info = request_info(&req);
        assert_eq!(info.method, "POST");
        assert_eq!(info.path, "/api/properties");
        assert_eq!(info.user_agent, "Mozilla/5.0");
        assert_eq!(info.user_id.as_deref(), Some("user-42"));
        assert!(info.has_auth_signal);
        assert!(info.has_api_credential);
    }

    #[test]
    fn test_repeated_user_agent_keeps_every_value() {
        let info = request_info(&request(&[
            ("user-agent", "Mozilla/5.0"),
            ("user-agent", "Googlebot/2.1"),
        ]));
        assert_eq!(info.user_agent, "Mozilla/5.0, Googlebot/2.1");

        let info = request_info(&request(&[]));
        assert_eq!(info.user_agent, "");
    }

    #[test]
    fn test_absent_signals() {
        let info = request_info(&request(&[("cookie", "session=; theme=dark"), (X_API_KEY, " ")]));
        assert!(!info.has_auth_signal);
        assert!(!info.has_api_credential);
        assert!(info.user_id.is_none());

        let info = request_info(&request(&[("authorization", "Bearer x")]));
        assert!(info.has_auth_signal);
    }
}
