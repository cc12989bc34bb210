//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests by method, status
//! - `gate_request_duration_seconds` (histogram): latency distribution
//! - `gate_denials_total` (counter): early denials by reason
//! - `gate_blocked_ips` (gauge): currently blocked addresses
//! - `gate_alerts_total` (counter): performance alerts by kind, severity
//! - `gate_audit_entries_total` (counter): audit entries by severity
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, duration: Duration) {
    counter!(
        "gate_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gate_request_duration_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_denial(reason: &'static str) {
    counter!("gate_denials_total", "reason" => reason).increment(1);
}

pub fn record_blocked_ips(count: usize) {
    gauge!("gate_blocked_ips").set(count as f64);
}

pub fn record_alert(kind: &'static str, severity: &'static str) {
    counter!("gate_alerts_total", "kind" => kind, "severity" => severity).increment(1);
}

pub fn record_audit_entry(severity: &'static str) {
    counter!("gate_audit_entries_total", "severity" => severity).increment(1);
}
