//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the security gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Deployment environment (affects key derivation and audit forwarding).
    pub environment: Environment,

    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Fixed-window rate limiting.
    pub rate_limiting: RateLimitConfig,

    /// Audit logging policy.
    pub audit_logging: AuditConfig,

    /// Security response headers.
    pub security_headers: SecurityHeadersConfig,

    /// Performance monitoring thresholds.
    pub performance: PerformanceConfig,

    /// IP lists, user-agent signatures and path protection.
    pub security: SecurityConfig,

    /// Background task intervals.
    pub maintenance: MaintenanceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Reporting surface.
    pub admin: AdminConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    #[default]
    Production,
    Test,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// How the rate-limit key is derived from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyGenerator {
    /// Explicit user id header when present, else the client IP.
    #[default]
    UserOrIp,
    /// Client IP only.
    Ip,
    /// One shared bucket for every request.
    Constant,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Requests allowed per key per window.
    pub max_requests: u32,

    /// Key derivation strategy.
    pub key_generator: KeyGenerator,

    /// Probability in [0, 1] that a check triggers a sweep of expired entries.
    pub cleanup_probability: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 15 * 60 * 1000,
            max_requests: 100,
            key_generator: KeyGenerator::UserOrIp,
            cleanup_probability: 0.1,
        }
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,

    /// Record a summary entry for every request.
    pub log_all_requests: bool,

    /// Record a summary entry only for requests answered with status >= 400.
    pub log_failed_only: bool,

    /// Ring buffer capacity.
    pub max_entries: usize,

    /// External sink for critical entries (production only).
    pub sink_url: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_all_requests: true,
            log_failed_only: false,
            max_entries: 10_000,
            sink_url: None,
        }
    }
}

/// Security response header policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    pub enabled: bool,

    /// Adds Strict-Transport-Security.
    pub strict_mode: bool,

    /// Content-Security-Policy value; `None` disables the header.
    pub content_security_policy: Option<String>,

    /// Send the CSP as Content-Security-Policy-Report-Only.
    pub csp_report_only: bool,

    pub hsts_max_age_secs: u64,
    pub frame_options: String,
    pub referrer_policy: String,
    pub permissions_policy: Option<String>,
    pub cross_origin_opener_policy: String,
    pub cross_origin_resource_policy: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict_mode: false,
            content_security_policy: Some(
                "default-src 'self'; object-src 'none'; base-uri 'self'; \
                 form-action 'self'; frame-ancestors 'none'"
                    .to_string(),
            ),
            csp_report_only: false,
            hsts_max_age_secs: 31_536_000,
            frame_options: "DENY".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            permissions_policy: Some(
                "camera=(), microphone=(), geolocation=(self), payment=(self), \
                 fullscreen=(self), display-capture=()"
                    .to_string(),
            ),
            cross_origin_opener_policy: "same-origin-allow-popups".to_string(),
            cross_origin_resource_policy: "cross-origin".to_string(),
        }
    }
}

/// Performance monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub enabled: bool,
    pub thresholds: Thresholds,
    pub max_metrics: usize,
    pub max_alerts: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thresholds: Thresholds::default(),
            max_metrics: 10_000,
            max_alerts: 1_000,
        }
    }
}

/// Alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    pub slow_request_ms: u64,
    pub very_slow_request_ms: u64,
    pub high_memory_mb: f64,
    pub critical_memory_mb: f64,
    pub high_error_rate: f64,
    pub critical_error_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            slow_request_ms: 2_000,
            very_slow_request_ms: 5_000,
            high_memory_mb: 512.0,
            critical_memory_mb: 1_024.0,
            high_error_rate: 0.05,
            critical_error_rate: 0.10,
        }
    }
}

/// IP lists, abuse signatures and path protection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// When set, only these IPs are admitted.
    pub ip_whitelist: Option<Vec<String>>,

    /// Always denied.
    pub ip_blacklist: Vec<String>,

    /// Case-insensitive regex signatures for abusive user agents.
    pub user_agent_blacklist: Vec<String>,

    /// Suspicious hits before an IP is blocked.
    pub escalation_threshold: u32,

    /// How long an escalated block lasts.
    pub block_ttl_secs: u64,

    pub path_protection: PathProtectionConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            ip_whitelist: None,
            ip_blacklist: Vec::new(),
            user_agent_blacklist: vec![
                "bot".to_string(),
                "crawler".to_string(),
                "spider".to_string(),
                "scraper".to_string(),
            ],
            escalation_threshold: 5,
            block_ttl_secs: 24 * 60 * 60,
            path_protection: PathProtectionConfig::default(),
        }
    }
}

/// Path-prefix authorization policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathProtectionConfig {
    pub admin_paths: Vec<String>,
    pub api_paths: Vec<String>,

    /// Require an auth signal on admin paths.
    pub require_auth: bool,
}

impl Default for PathProtectionConfig {
    fn default() -> Self {
        Self {
            admin_paths: vec!["/admin".to_string(), "/api/admin".to_string()],
            api_paths: vec!["/api".to_string()],
            require_auth: false,
        }
    }
}

/// Background task intervals.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Suspicion counter and blocklist housekeeping.
    pub housekeeping_interval_secs: u64,

    /// Metric and alert pruning.
    pub prune_interval_secs: u64,

    /// Trailing-minute error rate evaluation.
    pub error_rate_interval_secs: u64,

    /// Process memory sampling.
    pub memory_sample_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            housekeeping_interval_secs: 60 * 60,
            prune_interval_secs: 5 * 60,
            error_rate_interval_secs: 60,
            memory_sample_interval_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Default admin key. Rejected by validation when the admin API is enabled.
pub const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Admin reporting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the reporting routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_ADMIN_KEY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: GateConfig = toml::from_str(
            r#"
            environment = "test"

            [rate_limiting]
            max_requests = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.rate_limiting.max_requests, 5);
        assert_eq!(config.rate_limiting.window_ms, 15 * 60 * 1000);
        assert_eq!(config.security.escalation_threshold, 5);
        assert_eq!(config.audit_logging.max_entries, 10_000);
    }

    #[test]
    fn test_key_generator_names() {
        let config: RateLimitConfig = toml::from_str(r#"key_generator = "constant""#).unwrap();
        assert_eq!(config.key_generator, KeyGenerator::Constant);
    }
}
