//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! consistency. All errors are collected, not just the first.

use std::net::IpAddr;

use regex::RegexBuilder;

use crate::config::schema::{GateConfig, PLACEHOLDER_ADMIN_KEY};
use crate::security::headers::build_security_headers;

/// Longest accepted rate-limit window: one day.
pub const MAX_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;
/// Longest accepted automatic block: one year.
pub const MAX_BLOCK_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let rl = &config.rate_limiting;
    if rl.window_ms == 0 {
        errors.push(ValidationError::new("rate_limiting.window_ms", "must be > 0"));
    } else if rl.window_ms > MAX_WINDOW_MS {
        errors.push(ValidationError::new(
            "rate_limiting.window_ms",
            format!("must be <= {}", MAX_WINDOW_MS),
        ));
    }
    if !(0.0..=1.0).contains(&rl.cleanup_probability) {
        errors.push(ValidationError::new(
            "rate_limiting.cleanup_probability",
            "must be within [0, 1]",
        ));
    }

    if config.audit_logging.max_entries == 0 {
        errors.push(ValidationError::new("audit_logging.max_entries", "must be > 0"));
    }
    if let Some(sink) = &config.audit_logging.sink_url {
        if let Err(e) = url::Url::parse(sink) {
            errors.push(ValidationError::new(
                "audit_logging.sink_url",
                format!("invalid URL: {}", e),
            ));
        }
    }

    if let Err(e) = build_security_headers(&config.security_headers) {
        errors.push(ValidationError::new("security_headers", e.to_string()));
    }

    let perf = &config.performance;
    if perf.max_metrics == 0 {
        errors.push(ValidationError::new("performance.max_metrics", "must be > 0"));
    }
    if perf.max_alerts == 0 {
        errors.push(ValidationError::new("performance.max_alerts", "must be > 0"));
    }
    let t = &perf.thresholds;
    if t.slow_request_ms > t.very_slow_request_ms {
        errors.push(ValidationError::new(
            "performance.thresholds",
            "slow_request_ms must not exceed very_slow_request_ms",
        ));
    }
    if t.high_memory_mb > t.critical_memory_mb {
        errors.push(ValidationError::new(
            "performance.thresholds",
            "high_memory_mb must not exceed critical_memory_mb",
        ));
    }
    if t.high_error_rate > t.critical_error_rate {
        errors.push(ValidationError::new(
            "performance.thresholds",
            "high_error_rate must not exceed critical_error_rate",
        ));
    }

    let sec = &config.security;
    let ip_lists = sec
        .ip_blacklist
        .iter()
        .map(|ip| ("security.ip_blacklist", ip))
        .chain(
            sec.ip_whitelist
                .iter()
                .flatten()
                .map(|ip| ("security.ip_whitelist", ip)),
        );
    for (field, ip) in ip_lists {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(field, format!("invalid IP '{}'", ip)));
        }
    }
    for pattern in &sec.user_agent_blacklist {
        if let Err(e) = RegexBuilder::new(pattern).case_insensitive(true).build() {
            errors.push(ValidationError::new(
                "security.user_agent_blacklist",
                format!("invalid pattern '{}': {}", pattern, e),
            ));
        }
    }
    if sec.escalation_threshold == 0 {
        errors.push(ValidationError::new("security.escalation_threshold", "must be > 0"));
    }
    if sec.block_ttl_secs == 0 || sec.block_ttl_secs > MAX_BLOCK_TTL_SECS {
        errors.push(ValidationError::new(
            "security.block_ttl_secs",
            format!("must be within 1..={}", MAX_BLOCK_TTL_SECS),
        ));
    }

    let admin = &config.admin;
    if admin.enabled && (admin.api_key.trim().is_empty() || admin.api_key == PLACEHOLDER_ADMIN_KEY) {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set to a real key when the admin API is enabled",
        ));
    }

    let m = &config.maintenance;
    for (field, value) in [
        ("maintenance.housekeeping_interval_secs", m.housekeeping_interval_secs),
        ("maintenance.prune_interval_secs", m.prune_interval_secs),
        ("maintenance.error_rate_interval_secs", m.error_rate_interval_secs),
        ("maintenance.memory_sample_interval_secs", m.memory_sample_interval_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GateConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GateConfig::default();
        config.rate_limiting.window_ms = 0;
        config.rate_limiting.cleanup_probability = 1.5;
        config.security.ip_blacklist.push("not-an-ip".into());
        config.security.user_agent_blacklist.push("(unclosed".into());
        config.audit_logging.sink_url = Some("::nope".into());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"rate_limiting.window_ms"));
        assert!(fields.contains(&"rate_limiting.cleanup_probability"));
        assert!(fields.contains(&"security.ip_blacklist"));
        assert!(fields.contains(&"security.user_agent_blacklist"));
        assert!(fields.contains(&"audit_logging.sink_url"));
    }

    #[test]
    fn test_rejects_oversized_window_and_ttl() {
        let mut config = GateConfig::default();
        config.rate_limiting.window_ms = u64::MAX;
        config.security.block_ttl_secs = 10_u64.pow(16);

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["rate_limiting.window_ms", "security.block_ttl_secs"]);

        config.rate_limiting.window_ms = MAX_WINDOW_MS;
        config.security.block_ttl_secs = MAX_BLOCK_TTL_SECS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_enabled_admin_needs_real_key() {
        let mut config = GateConfig::default();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "admin.api_key");

        config.admin.api_key = "  ".to_string();
        assert!(validate_config(&config).is_err());

        config.admin.api_key = "s3cret-admin-key".to_string();
        assert!(validate_config(&config).is_ok());

        config.admin.enabled = false;
        config.admin.api_key = PLACEHOLDER_ADMIN_KEY.to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_threshold_ordering() {
        let mut config = GateConfig::default();
        config.performance.thresholds.high_error_rate = 0.5;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "performance.thresholds");
    }
}
