//! Request performance monitoring.
//!
//! # Responsibilities
//! - Keep a capped buffer of per-request metrics
//! - Raise latency and memory alerts as metrics arrive
//! - Evaluate the trailing-minute error rate on a timer
//! - Aggregate latency percentiles, throughput and error counts
//!
//! # Percentiles
//! Nearest rank without interpolation: sort ascending and index at
//! `floor(n * p)`. For latencies `1..=100` this gives p95 = 96, p99 = 100.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write as _;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::audit::logger::ALERT_TARGET;
use crate::audit::Severity;
use crate::clock::{Clock, Timeframe};
use crate::config::{PerformanceConfig, Thresholds};
use crate::error::GateError;
use crate::observability::memory::MemoryProbe;
use crate::observability::metrics;

const MINUTE_MS: i64 = 60 * 1000;
const METRIC_RETENTION_MS: i64 = 60 * MINUTE_MS;
const ALERT_RETENTION_MS: i64 = 24 * 60 * MINUTE_MS;

/// One observed request or instrumented call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetric {
    pub timestamp: DateTime<Utc>,
    pub route: String,
    pub method: String,
    pub duration_ms: u64,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Process memory at record time, MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
}

/// A metric before the monitor stamps it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSample {
    pub route: String,
    pub method: String,
    pub duration_ms: u64,
    pub status_code: u16,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub response_size: Option<u64>,
}

impl MetricSample {
    pub fn new(route: impl Into<String>, method: impl Into<String>, duration_ms: u64, status_code: u16) -> Self {
        Self {
            route: route.into(),
            method: method.into(),
            duration_ms,
            status_code,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SlowRequest,
    HighMemory,
    ErrorRate,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::SlowRequest => "slow_request",
            AlertKind::HighMemory => "high_memory",
            AlertKind::ErrorRate => "error_rate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceAlert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    /// The metric that triggered the alert (for error rate: the oldest in the minute).
    pub metric: PerformanceMetric,
    pub threshold: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub current: f64,
    pub peak: f64,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointTiming {
    /// `"METHOD route"`.
    pub route: String,
    pub average_ms: f64,
    pub request_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub average_response_time: f64,
    pub p95_response_time: u64,
    pub p99_response_time: u64,
    pub requests_per_minute: f64,
    pub error_rate: f64,
    pub memory_usage: MemoryUsage,
    pub slowest_endpoints: Vec<EndpointTiming>,
    pub errors_by_endpoint: BTreeMap<String, usize>,
}

/// Filters for [`PerformanceMonitor::get_metrics`]. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricFilter {
    /// Substring match on the route.
    pub route: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub min_duration: Option<u64>,
    pub max_duration: Option<u64>,
    pub since: Option<DateTime<Utc>>,
}

impl MetricFilter {
    fn matches(&self, m: &PerformanceMetric) -> bool {
        self.route.as_deref().map_or(true, |r| m.route.contains(r))
            && self.method.as_deref().map_or(true, |v| m.method == v)
            && self.status_code.map_or(true, |s| m.status_code == s)
            && self.min_duration.map_or(true, |d| m.duration_ms >= d)
            && self.max_duration.map_or(true, |d| m.duration_ms <= d)
            && self.since.map_or(true, |t| m.timestamp >= t)
    }
}

pub type AlertCallback = Arc<dyn Fn(&PerformanceAlert) + Send + Sync>;

pub struct PerformanceMonitor {
    metrics: RwLock<VecDeque<PerformanceMetric>>,
    alerts: RwLock<VecDeque<PerformanceAlert>>,
    observers: RwLock<Vec<AlertCallback>>,
    thresholds: RwLock<Thresholds>,
    max_metrics: usize,
    max_alerts: usize,
    clock: Arc<dyn Clock>,
    memory: Arc<dyn MemoryProbe>,
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("metrics", &self.metrics.read().len())
            .field("alerts", &self.alerts.read().len())
            .field("observers", &self.observers.read().len())
            .field("thresholds", &*self.thresholds.read())
            .finish()
    }
}

impl PerformanceMonitor {
    pub fn new(config: &PerformanceConfig, clock: Arc<dyn Clock>, memory: Arc<dyn MemoryProbe>) -> Self {
        Self {
            metrics: RwLock::new(VecDeque::new()),
            alerts: RwLock::new(VecDeque::new()),
            observers: RwLock::new(Vec::new()),
            thresholds: RwLock::new(config.thresholds),
            max_metrics: config.max_metrics.max(1),
            max_alerts: config.max_alerts.max(1),
            clock,
            memory,
        }
    }

    /// Resample process memory. Called from maintenance, never per request.
    pub fn refresh_memory(&self) {
        self.memory.refresh();
    }

    /// Stamp and store a sample, then raise any latency or memory alerts.
    pub fn record_metric(&self, sample: MetricSample) -> PerformanceMetric {
        let metric = PerformanceMetric {
            timestamp: self.clock.now(),
            route: sample.route,
            method: sample.method,
            duration_ms: sample.duration_ms,
            status_code: sample.status_code,
            user_agent: sample.user_agent,
            ip: sample.ip,
            memory_mb: Some(self.memory.used_mb()),
            response_size: sample.response_size,
        };

        {
            let mut metrics = self.metrics.write();
            while metrics.len() >= self.max_metrics {
                metrics.pop_front();
            }
            metrics.push_back(metric.clone());
        }

        self.check_immediate_alerts(&metric);
        metric
    }

    fn check_immediate_alerts(&self, metric: &PerformanceMetric) {
        let t = *self.thresholds.read();

        if metric.duration_ms > t.very_slow_request_ms {
            self.emit(PerformanceAlert {
                kind: AlertKind::SlowRequest,
                severity: Severity::Critical,
                message: format!("Very slow request: {} took {}ms", metric.route, metric.duration_ms),
                metric: metric.clone(),
                threshold: t.very_slow_request_ms as f64,
                value: metric.duration_ms as f64,
            });
        } else if metric.duration_ms > t.slow_request_ms {
            self.emit(PerformanceAlert {
                kind: AlertKind::SlowRequest,
                severity: Severity::Medium,
                message: format!("Slow request: {} took {}ms", metric.route, metric.duration_ms),
                metric: metric.clone(),
                threshold: t.slow_request_ms as f64,
                value: metric.duration_ms as f64,
            });
        }

        if let Some(memory_mb) = metric.memory_mb {
            if memory_mb > t.critical_memory_mb {
                self.emit(PerformanceAlert {
                    kind: AlertKind::HighMemory,
                    severity: Severity::Critical,
                    message: format!("Critical memory usage: {:.2}MB", memory_mb),
                    metric: metric.clone(),
                    threshold: t.critical_memory_mb,
                    value: memory_mb,
                });
            } else if memory_mb > t.high_memory_mb {
                self.emit(PerformanceAlert {
                    kind: AlertKind::HighMemory,
                    severity: Severity::Medium,
                    message: format!("High memory usage: {:.2}MB", memory_mb),
                    metric: metric.clone(),
                    threshold: t.high_memory_mb,
                    value: memory_mb,
                });
            }
        }
    }

    /// Evaluate the error rate over the trailing minute.
    ///
    /// Returns the alert raised, if any. A minute without requests raises nothing.
    pub fn check_error_rate(&self) -> Option<PerformanceAlert> {
        let cutoff = self.clock.now_ms() - MINUTE_MS;
        let (total, errors, reference) = {
            let metrics = self.metrics.read();
            let mut recent = metrics
                .iter()
                .filter(|m| m.timestamp.timestamp_millis() >= cutoff)
                .peekable();
            let reference = recent.peek().cloned().cloned();
            let (total, errors) = recent.fold((0usize, 0usize), |(t, e), m| {
                (t + 1, e + usize::from(m.status_code >= 400))
            });
            (total, errors, reference)
        };

        let reference = reference?;
        let rate = errors as f64 / total as f64;
        let t = *self.thresholds.read();

        let (severity, label, threshold) = if rate > t.critical_error_rate {
            (Severity::Critical, "Critical", t.critical_error_rate)
        } else if rate > t.high_error_rate {
            (Severity::High, "High", t.high_error_rate)
        } else {
            return None;
        };

        let alert = PerformanceAlert {
            kind: AlertKind::ErrorRate,
            severity,
            message: format!("{} error rate: {:.2}%", label, rate * 100.0),
            metric: reference,
            threshold,
            value: rate,
        };
        self.emit(alert.clone());
        Some(alert)
    }

    fn emit(&self, alert: PerformanceAlert) {
        {
            let mut alerts = self.alerts.write();
            while alerts.len() >= self.max_alerts {
                alerts.pop_front();
            }
            alerts.push_back(alert.clone());
        }
        metrics::record_alert(alert.kind.as_str(), alert.severity.as_str());

        if alert.severity == Severity::Critical {
            tracing::error!(
                target: ALERT_TARGET,
                kind = alert.kind.as_str(),
                value = alert.value,
                threshold = alert.threshold,
                "{}",
                alert.message
            );
        } else {
            tracing::warn!(kind = alert.kind.as_str(), "{}", alert.message);
        }

        // Snapshot so observers may register further observers.
        let observers: Vec<AlertCallback> = self.observers.read().clone();
        for observer in observers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer(&alert))) {
                let error = GateError::from_panic(payload);
                tracing::error!(error = %error, "Alert observer failed");
            }
        }
    }

    /// Register an observer, called synchronously for every alert in registration order.
    pub fn on_alert<F>(&self, callback: F)
    where
        F: Fn(&PerformanceAlert) + Send + Sync + 'static,
    {
        self.observers.write().push(Arc::new(callback));
    }

    /// Drop metrics older than an hour and alerts older than a day.
    /// Returns (metrics removed, alerts removed).
    pub fn prune(&self) -> (usize, usize) {
        let now = self.clock.now_ms();

        let mut metrics = self.metrics.write();
        let before = metrics.len();
        metrics.retain(|m| m.timestamp.timestamp_millis() >= now - METRIC_RETENTION_MS);
        let metrics_removed = before - metrics.len();
        drop(metrics);

        let mut alerts = self.alerts.write();
        let before = alerts.len();
        alerts.retain(|a| a.metric.timestamp.timestamp_millis() >= now - ALERT_RETENTION_MS);
        let alerts_removed = before - alerts.len();

        (metrics_removed, alerts_removed)
    }

    pub fn get_stats(&self, timeframe: Timeframe) -> PerformanceStats {
        let cutoff = self.clock.now_ms() - timeframe.duration_ms();
        let metrics = self.metrics.read();
        let relevant: Vec<&PerformanceMetric> = metrics
            .iter()
            .filter(|m| m.timestamp.timestamp_millis() >= cutoff)
            .collect();

        if relevant.is_empty() {
            return PerformanceStats::default();
        }

        let n = relevant.len();
        let mut durations: Vec<u64> = relevant.iter().map(|m| m.duration_ms).collect();
        durations.sort_unstable();

        let average_response_time = durations.iter().sum::<u64>() as f64 / n as f64;
        let p95_response_time = durations[nearest_rank(n, 0.95)];
        let p99_response_time = durations[nearest_rank(n, 0.99)];
        let requests_per_minute = n as f64 / timeframe.minutes() as f64;

        let error_count = relevant.iter().filter(|m| m.status_code >= 400).count();
        let error_rate = error_count as f64 / n as f64;

        let samples: Vec<f64> = relevant.iter().filter_map(|m| m.memory_mb).collect();
        let memory_usage = MemoryUsage {
            current: self.memory.used_mb(),
            peak: samples.iter().copied().fold(0.0, f64::max),
            average: if samples.is_empty() {
                0.0
            } else {
                samples.iter().sum::<f64>() / samples.len() as f64
            },
        };

        let mut endpoints: HashMap<String, (u64, usize)> = HashMap::new();
        let mut errors_by_endpoint = BTreeMap::new();
        for m in &relevant {
            let key = format!("{} {}", m.method, m.route);
            if m.status_code >= 400 {
                *errors_by_endpoint.entry(key.clone()).or_insert(0) += 1;
            }
            let slot = endpoints.entry(key).or_insert((0, 0));
            slot.0 += m.duration_ms;
            slot.1 += 1;
        }

        let mut slowest_endpoints: Vec<EndpointTiming> = endpoints
            .into_iter()
            .map(|(route, (total, count))| EndpointTiming {
                route,
                average_ms: total as f64 / count as f64,
                request_count: count,
            })
            .collect();
        slowest_endpoints.sort_by(|a, b| {
            b.average_ms
                .total_cmp(&a.average_ms)
                .then_with(|| a.route.cmp(&b.route))
        });
        slowest_endpoints.truncate(10);

        PerformanceStats {
            average_response_time,
            p95_response_time,
            p99_response_time,
            requests_per_minute,
            error_rate,
            memory_usage,
            slowest_endpoints,
            errors_by_endpoint,
        }
    }

    /// Alerts whose triggering metric is within `hours`, newest first.
    pub fn get_recent_alerts(&self, hours: u32) -> Vec<PerformanceAlert> {
        let cutoff = self.clock.now_ms() - i64::from(hours) * 60 * MINUTE_MS;
        let alerts = self.alerts.read();
        let mut recent: Vec<PerformanceAlert> = alerts
            .iter()
            .rev()
            .filter(|a| a.metric.timestamp.timestamp_millis() >= cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.metric.timestamp.cmp(&a.metric.timestamp));
        recent
    }

    /// Stored metrics matching `filter`, newest first.
    pub fn get_metrics(&self, filter: &MetricFilter) -> Vec<PerformanceMetric> {
        let metrics = self.metrics.read();
        let mut matched: Vec<PerformanceMetric> = metrics
            .iter()
            .rev()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched
    }

    /// Human-readable summary of the timeframe.
    pub fn generate_report(&self, timeframe: Timeframe) -> String {
        let stats = self.get_stats(timeframe);
        let hours = (timeframe.minutes() / 60).max(1) as u32;
        let alerts = self.get_recent_alerts(hours);

        let mut out = String::new();
        let _ = writeln!(out, "# Performance Report ({})", timeframe.as_str());
        let _ = writeln!(out);
        let _ = writeln!(out, "## Overview");
        let _ = writeln!(out, "- Average Response Time: {:.2}ms", stats.average_response_time);
        let _ = writeln!(out, "- P95 Response Time: {}ms", stats.p95_response_time);
        let _ = writeln!(out, "- P99 Response Time: {}ms", stats.p99_response_time);
        let _ = writeln!(out, "- Requests per Minute: {:.2}", stats.requests_per_minute);
        let _ = writeln!(out, "- Error Rate: {:.2}%", stats.error_rate * 100.0);
        let _ = writeln!(out);
        let _ = writeln!(out, "## Memory Usage");
        let _ = writeln!(out, "- Current: {:.2}MB", stats.memory_usage.current);
        let _ = writeln!(out, "- Peak: {:.2}MB", stats.memory_usage.peak);
        let _ = writeln!(out, "- Average: {:.2}MB", stats.memory_usage.average);
        let _ = writeln!(out);
        let _ = writeln!(out, "## Slowest Endpoints");
        for ep in &stats.slowest_endpoints {
            let _ = writeln!(
                out,
                "- {}: {:.2}ms avg ({} requests)",
                ep.route, ep.average_ms, ep.request_count
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "## Errors by Endpoint");
        for (endpoint, count) in &stats.errors_by_endpoint {
            let _ = writeln!(out, "- {}: {} errors", endpoint, count);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "## Recent Alerts ({})", alerts.len());
        for alert in alerts.iter().take(10) {
            let _ = writeln!(
                out,
                "- [{}] {} ({})",
                alert.severity.as_str().to_uppercase(),
                alert.message,
                alert.metric.timestamp.to_rfc3339()
            );
        }
        out.trim_end().to_string()
    }

    pub fn set_thresholds(&self, thresholds: Thresholds) {
        *self.thresholds.write() = thresholds;
    }

    pub fn thresholds(&self) -> Thresholds {
        *self.thresholds.read()
    }

    pub fn metric_count(&self) -> usize {
        self.metrics.read().len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().len()
    }
}

/// Nearest-rank index `floor(n * p)`, clamped into range.
fn nearest_rank(n: usize, p: f64) -> usize {
    ((n as f64 * p).floor() as usize).min(n.saturating_sub(1))
}
