//! Capped in-memory audit log.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::audit::sink::AuditSink;
use crate::audit::types::{ActionCount, AuditLogEntry, AuditQuery, AuditStats, NewAuditEntry, Severity};
use crate::clock::{Clock, Timeframe};
use crate::config::Environment;
use crate::observability::metrics;

/// Default ring buffer capacity.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Tracing target for entries that need immediate human attention.
pub const ALERT_TARGET: &str = "security_alert";

/// Append-only audit log that keeps the most recent `capacity` entries.
#[derive(Debug)]
pub struct AuditLogger {
    entries: RwLock<VecDeque<AuditLogEntry>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    environment: Environment,
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditLogger {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>, environment: Environment) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            clock,
            environment,
            sink: None,
        }
    }

    /// Forward critical entries to `sink` (production only).
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Stamp and append an entry. The oldest entry is dropped once full.
    pub fn append(&self, entry: NewAuditEntry) -> AuditLogEntry {
        let entry = entry.stamp(self.clock.now());
        {
            let mut entries = self.entries.write();
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        metrics::record_audit_entry(entry.severity.as_str());

        if entry.severity == Severity::Critical {
            let details = Value::Object(entry.details.clone());
            tracing::error!(
                target: ALERT_TARGET,
                action = %entry.action,
                resource = %entry.resource,
                ip = entry.ip.as_deref().unwrap_or("-"),
                details = %details,
                "Critical audit event"
            );
            self.forward(&entry);
        }
        entry
    }

    fn forward(&self, entry: &AuditLogEntry) {
        if !self.environment.is_production() {
            return;
        }
        let Some(sink) = &self.sink else { return };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(action = %entry.action, "No runtime available, audit entry not forwarded");
            return;
        };
        let action = entry.action.clone();
        let fut = sink.forward(entry.clone());
        handle.spawn(async move {
            if let Err(e) = fut.await {
                tracing::warn!(action = %action, error = %e, "Failed to forward audit entry");
            }
        });
    }

    pub fn log_auth(
        &self,
        action: &str,
        user_id: Option<&str>,
        user_email: Option<&str>,
        ip: Option<&str>,
        user_agent: Option<&str>,
        details: Value,
    ) -> AuditLogEntry {
        let severity = if action.contains("failed") {
            Severity::High
        } else {
            Severity::Low
        };
        let mut entry = NewAuditEntry::new(format!("auth.{}", action), "auth", severity)
            .with_details(into_map(details));
        entry.user_id = user_id.map(str::to_string);
        entry.user_email = user_email.map(str::to_string);
        entry.ip = ip.map(str::to_string);
        entry.user_agent = user_agent.map(str::to_string);
        self.append(entry)
    }

    pub fn log_property(
        &self,
        action: &str,
        user_id: &str,
        property_id: &str,
        details: Value,
    ) -> AuditLogEntry {
        let severity = if action.contains("delete") {
            Severity::Medium
        } else {
            Severity::Low
        };
        self.append(
            NewAuditEntry::new(format!("property.{}", action), "property", severity)
                .with_user(user_id)
                .with_resource_id(property_id)
                .with_details(into_map(details)),
        )
    }

    pub fn log_payment(
        &self,
        action: &str,
        user_id: &str,
        payment_id: &str,
        details: Value,
    ) -> AuditLogEntry {
        let severity = if action.contains("failed") {
            Severity::High
        } else {
            Severity::Medium
        };
        self.append(
            NewAuditEntry::new(format!("payment.{}", action), "payment", severity)
                .with_user(user_id)
                .with_resource_id(payment_id)
                .with_details(into_map(details)),
        )
    }

    /// Security events are always critical.
    pub fn log_security(&self, action: &str, ip: &str, user_agent: &str, details: Value) -> AuditLogEntry {
        self.append(
            NewAuditEntry::new(format!("security.{}", action), "security", Severity::Critical)
                .with_ip(ip)
                .with_user_agent(user_agent)
                .with_details(into_map(details)),
        )
    }

    pub fn log_admin(
        &self,
        action: &str,
        admin_id: &str,
        resource: &str,
        resource_id: Option<&str>,
        details: Value,
    ) -> AuditLogEntry {
        let severity = if action.contains("delete") {
            Severity::High
        } else {
            Severity::Medium
        };
        let mut entry = NewAuditEntry::new(format!("admin.{}", action), resource, severity)
            .with_user(admin_id)
            .with_details(into_map(details));
        entry.resource_id = resource_id.map(str::to_string);
        self.append(entry)
    }

    /// Matching entries, newest first, truncated to `query.limit`.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditLogEntry> {
        let entries = self.entries.read();
        let mut matched: Vec<AuditLogEntry> = entries
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        // Stable sort keeps reverse append order among equal timestamps.
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Aggregate the entries recorded within `timeframe` of now.
    pub fn stats(&self, timeframe: Timeframe) -> AuditStats {
        let cutoff_ms = self.clock.now_ms() - timeframe.duration_ms();
        let entries = self.entries.read();

        let mut stats = AuditStats::default();
        let mut ips = HashSet::new();
        let mut actions: HashMap<&str, usize> = HashMap::new();

        for entry in entries
            .iter()
            .filter(|e| e.timestamp.timestamp_millis() >= cutoff_ms)
        {
            stats.total_events += 1;
            match entry.severity {
                Severity::Critical => stats.critical_events += 1,
                Severity::High => stats.high_severity_events += 1,
                _ => {}
            }
            if entry.action.starts_with("auth.") {
                stats.auth_events += 1;
            }
            if entry.action == "auth.login_failed" {
                stats.failed_logins += 1;
            }
            if let Some(ip) = entry.ip.as_deref().filter(|ip| !ip.is_empty()) {
                ips.insert(ip);
            }
            *actions.entry(entry.action.as_str()).or_default() += 1;
        }

        stats.unique_ips = ips.len();
        let mut top: Vec<ActionCount> = actions
            .into_iter()
            .map(|(action, count)| ActionCount {
                action: action.to_string(),
                count,
            })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.action.cmp(&b.action)));
        top.truncate(10);
        stats.top_actions = top;
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn into_map(details: Value) -> Map<String, Value> {
    match details {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::sink::SinkFuture;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn logger(capacity: usize) -> (Arc<ManualClock>, AuditLogger) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (clock.clone(), AuditLogger::new(capacity, clock, Environment::Test))
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let (_, log) = logger(3);
        for i in 0..4 {
            log.append(NewAuditEntry::new(format!("test.{}", i), "test", Severity::Low));
        }
        assert_eq!(log.len(), 3);

        let all = log.query(&AuditQuery::default());
        let actions: Vec<_> = all.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["test.3", "test.2", "test.1"]);
    }

    #[test]
    fn test_convenience_severities() {
        let (_, log) = logger(100);
        assert_eq!(log.log_auth("login", Some("u1"), None, None, None, json!({})).severity, Severity::Low);
        assert_eq!(
            log.log_auth("login_failed", None, Some("a@b.c"), Some("1.1.1.1"), None, json!({})).severity,
            Severity::High
        );
        assert_eq!(log.log_property("create", "u1", "p1", json!({})).severity, Severity::Low);
        assert_eq!(log.log_property("delete", "u1", "p1", json!({})).severity, Severity::Medium);
        assert_eq!(log.log_payment("completed", "u1", "pay1", json!({})).severity, Severity::Medium);
        assert_eq!(log.log_payment("failed", "u1", "pay1", json!({})).severity, Severity::High);
        assert_eq!(log.log_admin("user_delete", "a1", "user", Some("u9"), json!({})).severity, Severity::High);
        assert_eq!(log.log_admin("user_update", "a1", "user", None, json!({})).severity, Severity::Medium);

        let sec = log.log_security("blocked_ip_access", "9.9.9.9", "curl", json!({"path": "/"}));
        assert_eq!(sec.severity, Severity::Critical);
        assert_eq!(sec.action, "security.blocked_ip_access");
        assert_eq!(sec.details["path"], "/");
    }

    #[test]
    fn test_query_filters_and_limit() {
        let (clock, log) = logger(100);
        log.log_auth("login", Some("u1"), None, Some("1.1.1.1"), None, json!({}));
        clock.advance_secs(10);
        log.log_auth("login_failed", Some("u2"), None, Some("2.2.2.2"), None, json!({}));
        clock.advance_secs(10);
        log.log_property("delete", "u1", "p1", json!({}));

        let by_user = log.query(&AuditQuery {
            user_id: Some("u1".into()),
            ..Default::default()
        });
        assert_eq!(by_user.len(), 2);
        assert_eq!(by_user[0].action, "property.delete");

        let failed = log.query(&AuditQuery {
            action: Some("failed".into()),
            ..Default::default()
        });
        assert_eq!(failed.len(), 1);

        let latest = log.query(&AuditQuery {
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(latest[0].action, "property.delete");

        let windowed = log.query(&AuditQuery {
            start_date: Some(clock.now() - chrono::Duration::seconds(15)),
            end_date: Some(clock.now() - chrono::Duration::seconds(5)),
            ..Default::default()
        });
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].action, "auth.login_failed");

        let high = log.query(&AuditQuery {
            severity: Some(Severity::High),
            resource: Some("auth".into()),
            ..Default::default()
        });
        assert_eq!(high.len(), 1);
    }

    #[test]
    fn test_stats_window() {
        let (clock, log) = logger(100);
        log.log_auth("login_failed", None, None, Some("1.1.1.1"), None, json!({}));
        clock.advance_secs(2 * 60 * 60);
        log.log_auth("login_failed", None, None, Some("1.1.1.1"), None, json!({}));
        log.log_auth("login", None, None, Some("2.2.2.2"), None, json!({}));
        log.log_security("rate_limit_exceeded", "3.3.3.3", "ua", json!({}));
        log.append(NewAuditEntry::new("get._", "web", Severity::Low).with_ip(""));

        let hour = log.stats(Timeframe::Hour);
        assert_eq!(hour.total_events, 4);
        assert_eq!(hour.critical_events, 1);
        assert_eq!(hour.high_severity_events, 1);
        assert_eq!(hour.auth_events, 2);
        assert_eq!(hour.failed_logins, 1);
        assert_eq!(hour.unique_ips, 3);
        assert_eq!(hour.top_actions[0].action, "auth.login");

        let day = log.stats(Timeframe::Day);
        assert_eq!(day.total_events, 5);
        assert_eq!(day.failed_logins, 2);
        assert_eq!(day.top_actions[0], ActionCount { action: "auth.login_failed".into(), count: 2 });
    }

    #[derive(Debug, Default)]
    struct CountingSink(Arc<AtomicUsize>);

    impl AuditSink for CountingSink {
        fn forward(&self, _entry: AuditLogEntry) -> SinkFuture {
            let counter = self.0.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(crate::error::SinkError::Status(503))
            })
        }
    }

    #[tokio::test]
    async fn test_critical_entries_forwarded_in_production_only() {
        let clock = Arc::new(ManualClock::new(0));
        let forwarded = Arc::new(AtomicUsize::new(0));

        let prod = AuditLogger::new(10, clock.clone(), Environment::Production)
            .with_sink(Arc::new(CountingSink(forwarded.clone())));
        prod.log_security("middleware_error", "1.1.1.1", "ua", json!({}));
        prod.log_auth("login", None, None, None, None, json!({}));

        let dev = AuditLogger::new(10, clock, Environment::Development)
            .with_sink(Arc::new(CountingSink(forwarded.clone())));
        dev.log_security("middleware_error", "1.1.1.1", "ua", json!({}));

        for _ in 0..50 {
            if forwarded.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(forwarded.load(Ordering::SeqCst), 1);
        assert_eq!(prod.len(), 2);
    }
}
