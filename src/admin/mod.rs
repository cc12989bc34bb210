//! Bearer-protected reporting and administration routes.
//!
//! Mounted next to the gated application routes, not behind the gate, so an
//! operator can still inspect and unblock while traffic is being denied.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::context::GateContext;

pub fn setup_admin_router(ctx: Arc<GateContext>) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/alerts", get(get_alerts))
        .route("/admin/metrics", get(get_metrics))
        .route("/admin/report", get(get_report))
        .route("/admin/audit", get(get_audit))
        .route("/admin/audit/stats", get(get_audit_stats))
        .route("/admin/security", get(get_security))
        .route("/admin/block/{ip}", post(block_ip).delete(unblock_ip))
        .layer(middleware::from_fn_with_state(ctx.clone(), admin_auth_middleware))
        .with_state(ctx)
}
