//! Admin reporting routes served next to the gated application.

use axum::body::Body;
use axum::http::{Request, StatusCode};

mod common;
use common::*;

#[tokio::test]
async fn test_requires_bearer_key() {
    let gate = start_gate(production_config());

    let anonymous = Request::builder().uri("/admin/status").body(Body::empty()).unwrap();
    assert_eq!(send(&gate.router, anonymous).await.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/admin/status")
        .header("authorization", "Bearer nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&gate.router, wrong).await.status(), StatusCode::UNAUTHORIZED);

    let response = send(&gate.router, admin("GET", "/admin/status")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "operational");
    assert_eq!(body["environment"], "production");
}

#[tokio::test]
async fn test_block_and_unblock_lifecycle() {
    let gate = start_gate(production_config());
    let ip = "203.0.113.9";

    let response = send(&gate.router, admin("POST", &format!("/admin/block/{}", ip))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let blocked = body_json(response).await;
    assert_eq!(blocked["ip"], ip);
    assert_eq!(blocked["expires_at"], START_MS + 24 * 60 * 60 * 1000);

    let denied = send(&gate.router, get("/", ip)).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(denied).await["message"], "IP blocked");

    let overview = body_json(send(&gate.router, admin("GET", "/admin/security")).await).await;
    assert_eq!(overview["stats"]["blocked_ips"], 1);
    assert_eq!(overview["blocked_ips"][0]["ip"], ip);

    let path = format!("/admin/block/{}", ip);
    assert_eq!(send(&gate.router, admin("DELETE", &path)).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(send(&gate.router, admin("DELETE", &path)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(send(&gate.router, get("/", ip)).await.status(), StatusCode::OK);

    let audit = body_json(send(&gate.router, admin("GET", "/admin/audit?action=admin.")).await).await;
    let actions: Vec<&str> = audit
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert!(actions.contains(&"admin.block_ip"));
    assert!(actions.contains(&"admin.unblock_ip"));
}

#[tokio::test]
async fn test_block_rejects_invalid_ip() {
    let gate = start_gate(production_config());
    let response = send(&gate.router, admin("POST", "/admin/block/not-an-ip")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(gate.ctx.gate.blocked_ips().is_empty());
}

#[tokio::test]
async fn test_performance_reports() {
    let gate = start_gate(production_config());
    send(&gate.router, get("/listings", "10.0.0.1")).await;
    send(&gate.router, get("/listings", "10.0.0.2")).await;
    send(&gate.router, get("/contact", "10.0.0.3")).await;

    let stats = body_json(send(&gate.router, admin("GET", "/admin/stats?timeframe=day")).await).await;
    assert_eq!(stats["error_rate"], 0.0);
    assert_eq!(stats["memory_usage"]["current"], 64.0);
    assert_eq!(stats["slowest_endpoints"].as_array().unwrap().len(), 2);

    let metrics = body_json(send(&gate.router, admin("GET", "/admin/metrics?route=listings")).await).await;
    assert_eq!(metrics.as_array().unwrap().len(), 2);

    let none = body_json(send(&gate.router, admin("GET", "/admin/metrics?status_code=500")).await).await;
    assert!(none.as_array().unwrap().is_empty());

    let alerts = body_json(send(&gate.router, admin("GET", "/admin/alerts?hours=1")).await).await;
    assert!(alerts.as_array().unwrap().is_empty());

    let response = send(&gate.router, admin("GET", "/admin/report?timeframe=day")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_text(response).await;
    assert!(report.starts_with("# Performance Report (day)"));
    assert!(report.contains("GET /listings"));
}

#[tokio::test]
async fn test_audit_query_and_stats() {
    let gate = start_gate(production_config());
    for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
        send(&gate.router, get("/listings", ip)).await;
    }

    let limited = body_json(send(&gate.router, admin("GET", "/admin/audit?limit=2")).await).await;
    assert_eq!(limited.as_array().unwrap().len(), 2);

    let low = body_json(send(&gate.router, admin("GET", "/admin/audit?severity=low")).await).await;
    assert_eq!(low.as_array().unwrap().len(), 3);

    let stats = body_json(send(&gate.router, admin("GET", "/admin/audit/stats?timeframe=hour")).await).await;
    assert_eq!(stats["total_events"], 3);
    assert_eq!(stats["unique_ips"], 3);
    assert_eq!(stats["top_actions"][0]["action"], "get._listings");
    assert_eq!(stats["top_actions"][0]["count"], 3);
}

#[tokio::test]
async fn test_disabled_admin_falls_through_to_application() {
    let mut config = production_config();
    config.admin.enabled = false;
    let gate = start_gate(config);

    let response = send(&gate.router, admin("GET", "/admin/status")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["path"], "/admin/status");
}
