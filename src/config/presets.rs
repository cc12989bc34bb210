//! Named configuration presets.
//!
//! Presets are plain data: each one is a [`GateConfig`] value built on top of
//! the defaults. Overrides from a config file are applied afterwards by the
//! caller.

use crate::config::schema::{Environment, GateConfig};

/// Preset names accepted by [`preset`].
pub const PRESET_NAMES: &[&str] = &["development", "production", "strict"];

/// Relaxed settings for local work: no rate limiting, no per-request summaries.
pub fn development() -> GateConfig {
    let mut config = GateConfig {
        environment: Environment::Development,
        ..GateConfig::default()
    };
    config.rate_limiting.enabled = false;
    config.audit_logging.log_all_requests = false;
    config.audit_logging.log_failed_only = false;
    config.security_headers.strict_mode = false;
    config.security_headers.csp_report_only = true;
    config.observability.log_level = "debug".to_string();
    config
}

pub fn production() -> GateConfig {
    let mut config = GateConfig {
        environment: Environment::Production,
        ..GateConfig::default()
    };
    config.rate_limiting.enabled = true;
    config.rate_limiting.max_requests = 60;
    config.rate_limiting.window_ms = 15 * 60 * 1000;
    config.audit_logging.log_all_requests = true;
    config.security_headers.strict_mode = true;
    config.security.path_protection.require_auth = true;
    config
}

/// Production plus a tighter budget and command-line client signatures.
pub fn strict() -> GateConfig {
    let mut config = production();
    config.rate_limiting.max_requests = 30;
    config
        .security
        .user_agent_blacklist
        .extend(["curl".to_string(), "wget".to_string()]);
    config
}

/// Look up a preset by name.
pub fn preset(name: &str) -> Option<GateConfig> {
    match name {
        "development" => Some(development()),
        "production" => Some(production()),
        "strict" => Some(strict()),
        _ => None,
    }
}
