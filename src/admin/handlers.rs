use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{AuditLogEntry, AuditQuery, AuditStats};
use crate::clock::Timeframe;
use crate::config::Environment;
use crate::context::GateContext;
use crate::observability::performance::{MetricFilter, PerformanceAlert, PerformanceMetric, PerformanceStats};
use crate::security::blocklist::{BlockedIp, SuspicionCounter};
use crate::security::SecurityStats;

/// Actor recorded for changes made through the admin API.
const ADMIN_ACTOR: &str = "admin-api";

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub environment: Environment,
    pub uptime_secs: i64,
    pub audit_entries: usize,
    pub metrics: usize,
    pub alerts: usize,
}

#[derive(Serialize)]
pub struct SecurityOverview {
    pub stats: SecurityStats,
    pub blocked_ips: Vec<BlockedIp>,
    pub suspicious_activity: Vec<SuspicionCounter>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TimeframeParams {
    pub timeframe: Timeframe,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AlertParams {
    pub hours: u32,
}

impl Default for AlertParams {
    fn default() -> Self {
        Self { hours: 24 }
    }
}

pub async fn get_status(State(ctx): State<Arc<GateContext>>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        environment: ctx.gate.policy().config.environment,
        uptime_secs: ctx.uptime_secs(),
        audit_entries: ctx.audit.len(),
        metrics: ctx.performance.metric_count(),
        alerts: ctx.performance.alert_count(),
    })
}

pub async fn get_stats(
    State(ctx): State<Arc<GateContext>>,
    Query(params): Query<TimeframeParams>,
) -> Json<PerformanceStats> {
    Json(ctx.performance.get_stats(params.timeframe))
}

pub async fn get_alerts(
    State(ctx): State<Arc<GateContext>>,
    Query(params): Query<AlertParams>,
) -> Json<Vec<PerformanceAlert>> {
    Json(ctx.performance.get_recent_alerts(params.hours))
}

pub async fn get_metrics(
    State(ctx): State<Arc<GateContext>>,
    Query(filter): Query<MetricFilter>,
) -> Json<Vec<PerformanceMetric>> {
    Json(ctx.performance.get_metrics(&filter))
}

pub async fn get_report(
    State(ctx): State<Arc<GateContext>>,
    Query(params): Query<TimeframeParams>,
) -> String {
    ctx.performance.generate_report(params.timeframe)
}

pub async fn get_audit(
    State(ctx): State<Arc<GateContext>>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditLogEntry>> {
    Json(ctx.audit.query(&query))
}

pub async fn get_audit_stats(
    State(ctx): State<Arc<GateContext>>,
    Query(params): Query<TimeframeParams>,
) -> Json<AuditStats> {
    Json(ctx.audit.stats(params.timeframe))
}

pub async fn get_security(State(ctx): State<Arc<GateContext>>) -> Json<SecurityOverview> {
    Json(SecurityOverview {
        stats: ctx.gate.security_stats(),
        blocked_ips: ctx.gate.blocked_ips(),
        suspicious_activity: ctx.gate.suspicious_activity(),
    })
}

pub async fn block_ip(
    State(ctx): State<Arc<GateContext>>,
    Path(ip): Path<String>,
) -> Result<(StatusCode, Json<BlockedIp>), (StatusCode, Json<serde_json::Value>)> {
    if ip.parse::<IpAddr>().is_err() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Bad Request", "message": format!("invalid IP '{}'", ip) })),
        ));
    }

    let blocked = ctx.gate.block_ip(&ip);
    ctx.audit.log_admin(
        "block_ip",
        ADMIN_ACTOR,
        "security",
        Some(ip.as_str()),
        json!({ "expires_at": blocked.expires_at }),
    );
    tracing::info!(ip = %ip, "IP blocked via admin API");
    Ok((StatusCode::CREATED, Json(blocked)))
}

pub async fn unblock_ip(State(ctx): State<Arc<GateContext>>, Path(ip): Path<String>) -> StatusCode {
    if !ctx.gate.unblock_ip(&ip) {
        return StatusCode::NOT_FOUND;
    }
    ctx.audit
        .log_admin("unblock_ip", ADMIN_ACTOR, "security", Some(ip.as_str()), json!({}));
    tracing::info!(ip = %ip, "IP unblocked via admin API");
    StatusCode::NO_CONTENT
}
