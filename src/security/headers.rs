//! Security response headers.
//!
//! # Responsibilities
//! - Turn the data-only [`SecurityHeadersConfig`] into concrete header pairs
//! - Attach them to pass-through responses
//!
//! # Design Decisions
//! - Header values are built once per configuration, not per request
//! - Denial responses do not carry these headers
//! - HSTS is only sent in strict mode

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::config::SecurityHeadersConfig;
use crate::error::GateError;

/// Prebuilt header pairs.
pub type HeaderSet = Vec<(HeaderName, HeaderValue)>;

fn value(name: &'static str, raw: &str) -> Result<HeaderValue, GateError> {
    HeaderValue::from_str(raw).map_err(|e| GateError::InvalidHeader {
        name,
        reason: e.to_string(),
    })
}

/// Build the header set for `config`. Empty when disabled.
pub fn build_security_headers(config: &SecurityHeadersConfig) -> Result<HeaderSet, GateError> {
    let mut set = HeaderSet::new();
    if !config.enabled {
        return Ok(set);
    }

    if let Some(csp) = &config.content_security_policy {
        let name = if config.csp_report_only {
            header::CONTENT_SECURITY_POLICY_REPORT_ONLY
        } else {
            header::CONTENT_SECURITY_POLICY
        };
        set.push((name, value("content-security-policy", csp)?));
    }

    if config.strict_mode {
        let hsts = format!("max-age={}; includeSubDomains", config.hsts_max_age_secs);
        set.push((header::STRICT_TRANSPORT_SECURITY, value("strict-transport-security", &hsts)?));
    }

    set.push((header::X_FRAME_OPTIONS, value("x-frame-options", &config.frame_options)?));
    set.push((header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")));
    set.push((header::REFERRER_POLICY, value("referrer-policy", &config.referrer_policy)?));

    if let Some(permissions) = &config.permissions_policy {
        set.push((
            HeaderName::from_static("permissions-policy"),
            value("permissions-policy", permissions)?,
        ));
    }

    set.push((
        HeaderName::from_static("cross-origin-opener-policy"),
        value("cross-origin-opener-policy", &config.cross_origin_opener_policy)?,
    ));
    set.push((
        HeaderName::from_static("cross-origin-resource-policy"),
        value("cross-origin-resource-policy", &config.cross_origin_resource_policy)?,
    ));

    set.push((header::X_DNS_PREFETCH_CONTROL, HeaderValue::from_static("off")));
    set.push((
        HeaderName::from_static("x-download-options"),
        HeaderValue::from_static("noopen"),
    ));
    set.push((
        HeaderName::from_static("x-permitted-cross-domain-policies"),
        HeaderValue::from_static("none"),
    ));

    Ok(set)
}

/// Insert every header of `set`, replacing existing values.
pub fn apply_security_headers(headers: &mut HeaderMap, set: &[(HeaderName, HeaderValue)]) {
    for (name, value) in set {
        headers.insert(name.clone(), value.clone());
    }
}
