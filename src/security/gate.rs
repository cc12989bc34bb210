//! The security gate: one decision per inbound request.
//!
//! # Data Flow
//! ```text
//! RequestInfo
//!     → blocklist (dynamic blocks, static deny list, allow list)  → 403
//!     → user-agent signatures (suspicion, escalation to block)    → 403 on escalation
//!     → rate limiter (fixed window)                               → 429
//!     → path policy (admin auth signal, API credential)           → 401
//!     → Allow
//!
//! After the response is known (allowed or denied):
//!     record_outcome → PerformanceMonitor metric + audit summary
//! ```
//!
//! # Design Decisions
//! - Fail-open: a panic inside the checks is caught, audited as
//!   `security.middleware_error`, and the request is allowed
//! - The compiled policy is swapped atomically on reload; in-flight
//!   requests finish with the policy they started with

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::json;

use crate::audit::{AuditLogger, NewAuditEntry, Severity};
use crate::clock::Clock;
use crate::config::validation::validate_config;
use crate::config::{ConfigError, GateConfig};
use crate::error::GateError;
use crate::observability::metrics;
use crate::observability::performance::{MetricSample, PerformanceMonitor};
use crate::security::access_control::{check_path_access, resource_for_path};
use crate::security::blocklist::{BlockedIp, Blocklist, Escalation, SuspicionCounter};
use crate::security::headers::{build_security_headers, HeaderSet};
use crate::security::rate_limit::{derive_key, RateLimitDecision, RateLimiter};

/// What the gate sees of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub ip: String,
    pub user_agent: String,
    /// Explicit caller identity (`x-user-id`).
    pub user_id: Option<String>,
    /// Authorization header or session cookie present.
    pub has_auth_signal: bool,
    /// `x-api-key` or `x-csrf-token` present.
    pub has_api_credential: bool,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, path: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ip: ip.into(),
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_auth_signal(mut self, present: bool) -> Self {
        self.has_auth_signal = present;
        self
    }

    pub fn with_api_credential(mut self, present: bool) -> Self {
        self.has_api_credential = present;
        self
    }
}

/// Category of an early denial. Decides status and body title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    Blocked,
    RateLimited,
    Unauthorized,
}

impl DenialKind {
    pub fn status(self) -> u16 {
        match self {
            DenialKind::Blocked => 403,
            DenialKind::RateLimited => 429,
            DenialKind::Unauthorized => 401,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            DenialKind::Blocked => "Access Denied",
            DenialKind::RateLimited => "Rate Limit Exceeded",
            DenialKind::Unauthorized => "Unauthorized",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Denial {
    pub kind: DenialKind,
    pub message: String,
    /// Metric label.
    pub reason: &'static str,
    /// Set for rate-limit denials.
    pub rate_limit: Option<RateLimitDecision>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allow,
    Deny(Denial),
}

impl Verdict {
    fn deny(kind: DenialKind, message: impl Into<String>, reason: &'static str) -> Self {
        metrics::record_denial(reason);
        Verdict::Deny(Denial {
            kind,
            message: message.into(),
            reason,
            rate_limit: None,
        })
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// A validated configuration with its derived lookup structures.
#[derive(Debug)]
pub struct GatePolicy {
    pub config: GateConfig,
    user_agent_patterns: Vec<Regex>,
    whitelist: Option<HashSet<String>>,
    blacklist: HashSet<String>,
    security_headers: HeaderSet,
}

impl GatePolicy {
    pub fn compile(config: GateConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let user_agent_patterns = config
            .security
            .user_agent_blacklist
            .iter()
            .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
            .collect();
        let whitelist = config
            .security
            .ip_whitelist
            .as_ref()
            .map(|ips| ips.iter().cloned().collect());
        let blacklist = config.security.ip_blacklist.iter().cloned().collect();
        let security_headers = build_security_headers(&config.security_headers).unwrap_or_default();

        Ok(Self {
            config,
            user_agent_patterns,
            whitelist,
            blacklist,
            security_headers,
        })
    }

    fn statically_denied(&self, ip: &str) -> bool {
        self.blacklist.contains(ip)
            || self.whitelist.as_ref().is_some_and(|allowed| !allowed.contains(ip))
    }

    fn suspicious_user_agent(&self, user_agent: &str) -> bool {
        self.user_agent_patterns.iter().any(|re| re.is_match(user_agent))
    }

    /// Headers attached to pass-through responses.
    pub fn security_headers(&self) -> &HeaderSet {
        &self.security_headers
    }
}

/// Counters for the reporting surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityStats {
    pub blocked_ips: usize,
    pub suspicious_ips: usize,
    /// Keys currently at or over their limit.
    pub rate_limit_hits: usize,
    /// Requests counted across live rate-limit windows.
    pub tracked_requests: u64,
    pub rate_limit_keys: usize,
}

#[derive(Debug)]
pub struct SecurityGate {
    policy: ArcSwap<GatePolicy>,
    limiter: RateLimiter,
    blocklist: Blocklist,
    audit: Arc<AuditLogger>,
    performance: Arc<PerformanceMonitor>,
}

impl SecurityGate {
    pub fn new(
        policy: GatePolicy,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditLogger>,
        performance: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            policy: ArcSwap::from_pointee(policy),
            limiter: RateLimiter::new(clock.clone()),
            blocklist: Blocklist::new(clock),
            audit,
            performance,
        }
    }

    /// Current compiled policy.
    pub fn policy(&self) -> Arc<GatePolicy> {
        self.policy.load_full()
    }

    /// Decide whether the request may proceed. Never fails: internal errors allow.
    pub fn evaluate(&self, req: &RequestInfo) -> Verdict {
        let policy = self.policy.load();
        self.guarded(req, || self.check(req, &policy))
    }

    /// Run `check` inside the fail-open boundary.
    pub(crate) fn guarded<F>(&self, req: &RequestInfo, check: F) -> Verdict
    where
        F: FnOnce() -> Verdict,
    {
        match catch_unwind(AssertUnwindSafe(check)) {
            Ok(verdict) => verdict,
            Err(payload) => {
                self.record_failure(req, &GateError::from_panic(payload));
                Verdict::Allow
            }
        }
    }

    fn check(&self, req: &RequestInfo, policy: &GatePolicy) -> Verdict {
        let ip = req.ip.as_str();
        let security = &policy.config.security;

        if self.blocklist.is_blocked(ip) || policy.statically_denied(ip) {
            self.audit.log_security(
                "blocked_ip_access",
                ip,
                &req.user_agent,
                json!({ "path": req.path, "method": req.method, "reason": "IP in blocklist" }),
            );
            return Verdict::deny(DenialKind::Blocked, "IP blocked", "blocked_ip");
        }

        if policy.suspicious_user_agent(&req.user_agent) {
            let escalation =
                self.blocklist
                    .record_suspicious(ip, security.escalation_threshold, security.block_ttl_secs);
            self.audit.log_security(
                "suspicious_user_agent",
                ip,
                &req.user_agent,
                json!({ "path": req.path, "method": req.method, "userAgent": req.user_agent }),
            );
            if escalation == Escalation::Blocked {
                tracing::warn!(ip = %ip, ttl_secs = security.block_ttl_secs, "IP blocked after repeated suspicious requests");
                metrics::record_blocked_ips(self.blocklist.blocked_count());
                return Verdict::deny(
                    DenialKind::Blocked,
                    "Suspicious activity detected",
                    "suspicious_activity",
                );
            }
        }

        let rate_limiting = &policy.config.rate_limiting;
        if rate_limiting.enabled {
            let key = derive_key(
                rate_limiting.key_generator,
                policy.config.environment,
                req.user_id.as_deref(),
                ip,
            );
            let decision = self.limiter.check(&key, rate_limiting);
            if !decision.allowed {
                self.audit.log_security(
                    "rate_limit_exceeded",
                    ip,
                    &req.user_agent,
                    json!({
                        "path": req.path,
                        "method": req.method,
                        "key": key,
                        "limit": decision.limit,
                        "remaining": decision.remaining,
                        "resetTime": decision.reset_time,
                    }),
                );
                metrics::record_denial("rate_limited");
                return Verdict::Deny(Denial {
                    kind: DenialKind::RateLimited,
                    message: "Too many requests".to_string(),
                    reason: "rate_limited",
                    rate_limit: Some(decision),
                });
            }
        }

        if let Err(denial) = check_path_access(&security.path_protection, req) {
            self.audit.log_security(
                "unauthorized_path_access",
                ip,
                &req.user_agent,
                json!({ "path": req.path, "method": req.method, "reason": denial.message() }),
            );
            return Verdict::deny(DenialKind::Unauthorized, denial.message(), "unauthorized_path");
        }

        Verdict::Allow
    }

    /// Record the metric and audit summary for a finished request, allowed or denied.
    pub fn record_outcome(
        &self,
        req: &RequestInfo,
        status: u16,
        duration: Duration,
        response_size: Option<u64>,
    ) {
        let policy = self.policy.load();
        let duration_ms = duration.as_millis() as u64;
        metrics::record_request(&req.method, status, duration);

        if policy.config.performance.enabled {
            self.performance.record_metric(MetricSample {
                route: req.path.clone(),
                method: req.method.clone(),
                duration_ms,
                status_code: status,
                user_agent: Some(req.user_agent.clone()).filter(|ua| !ua.is_empty()),
                ip: Some(req.ip.clone()),
                response_size,
            });
        }

        let audit = &policy.config.audit_logging;
        if audit.enabled && (audit.log_all_requests || (audit.log_failed_only && status >= 400)) {
            let severity = if status >= 400 {
                Severity::Medium
            } else {
                Severity::Low
            };
            let action = format!("{}.{}", req.method.to_lowercase(), req.path.replace('/', "_"));
            let mut entry = NewAuditEntry::new(action, resource_for_path(&req.path), severity)
                .with_ip(req.ip.as_str())
                .with_user_agent(req.user_agent.as_str())
                .with_detail("path", req.path.as_str())
                .with_detail("method", req.method.as_str())
                .with_detail("statusCode", status)
                .with_detail("duration", duration_ms)
                .with_detail(
                    "responseSize",
                    response_size.map_or_else(|| json!("unknown"), |n| json!(n)),
                );
            entry.user_id = req.user_id.clone();
            self.audit.append(entry);
        }
    }

    /// Audit an internal failure. The request is still allowed.
    pub fn record_failure(&self, req: &RequestInfo, error: &GateError) {
        tracing::error!(path = %req.path, ip = %req.ip, error = %error, "Security gate failure, allowing request");
        let ip = if req.ip.is_empty() { "unknown" } else { req.ip.as_str() };
        let user_agent = if req.user_agent.is_empty() {
            "unknown"
        } else {
            req.user_agent.as_str()
        };
        self.audit.log_security(
            "middleware_error",
            ip,
            user_agent,
            json!({ "path": req.path, "method": req.method, "error": error.to_string() }),
        );
    }

    /// Manually block `ip` for the configured TTL.
    pub fn block_ip(&self, ip: &str) -> BlockedIp {
        let ttl = self.policy.load().config.security.block_ttl_secs;
        let blocked = self.blocklist.block(ip, ttl);
        metrics::record_blocked_ips(self.blocklist.blocked_count());
        blocked
    }

    /// Lift a block and forget the IP's suspicion count.
    pub fn unblock_ip(&self, ip: &str) -> bool {
        let removed = self.blocklist.unblock(ip);
        metrics::record_blocked_ips(self.blocklist.blocked_count());
        removed
    }

    pub fn blocked_ips(&self) -> Vec<BlockedIp> {
        self.blocklist.blocked_ips()
    }

    pub fn suspicious_activity(&self) -> Vec<SuspicionCounter> {
        self.blocklist.suspicious_activity()
    }

    pub fn security_stats(&self) -> SecurityStats {
        let limit = self.policy.load().config.rate_limiting.max_requests;
        let (rate_limit_hits, tracked_requests) = self.limiter.usage(limit);
        SecurityStats {
            blocked_ips: self.blocklist.blocked_count(),
            suspicious_ips: self.blocklist.suspicious_count(),
            rate_limit_hits,
            tracked_requests,
            rate_limit_keys: self.limiter.len(),
        }
    }

    /// Validate, compile and swap in a new configuration.
    pub fn update_config(&self, config: GateConfig) -> Result<(), ConfigError> {
        let policy = GatePolicy::compile(config)?;
        self.performance.set_thresholds(policy.config.performance.thresholds);
        self.policy.store(Arc::new(policy));
        tracing::info!("Security gate configuration updated");
        Ok(())
    }

    /// Hourly maintenance. Returns (expired blocks removed, expired rate-limit windows removed).
    pub fn housekeeping(&self) -> (usize, usize) {
        let blocks = self.blocklist.housekeeping();
        let windows = self.limiter.sweep_expired();
        metrics::record_blocked_ips(self.blocklist.blocked_count());
        (blocks, windows)
    }
}
