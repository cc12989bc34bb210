//! End-to-end behaviour of the gate in front of the application router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use tokio::sync::mpsc;

use marketplace_gate::audit::{AuditQuery, Severity};
use marketplace_gate::observability::MetricFilter;
use marketplace_gate::security::RequestInfo;
use marketplace_gate::{HttpServer, Shutdown};

mod common;
use common::*;

#[tokio::test]
async fn test_rate_limit_denies_only_the_101st_request() {
    let mut config = production_config();
    config.rate_limiting.max_requests = 100;
    config.rate_limiting.window_ms = 60_000;
    let gate = start_gate(config);

    let mut denials = Vec::new();
    for i in 0..101 {
        let response = send(&gate.router, get("/listings", "203.0.113.5")).await;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after: u64 = response.headers()["retry-after"]
                .to_str()
                .unwrap()
                .parse()
                .unwrap();
            denials.push((i, retry_after, response));
        } else {
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()["x-frame-options"],
                "DENY",
                "allowed responses carry security headers"
            );
        }
        gate.clock.advance_ms(100);
    }

    assert_eq!(denials.len(), 1);
    let (index, retry_after, response) = denials.pop().unwrap();
    assert_eq!(index, 100);
    assert!(retry_after > 0 && retry_after <= 60);
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

    let body = body_json(response).await;
    assert_eq!(body["error"], "Rate Limit Exceeded");
    assert_eq!(body["message"], "Too many requests");
}

#[tokio::test]
async fn test_window_rollover_admits_again() {
    let mut config = production_config();
    config.rate_limiting.max_requests = 1;
    config.rate_limiting.window_ms = 60_000;
    let gate = start_gate(config);

    assert_eq!(send(&gate.router, get("/", "198.51.100.2")).await.status(), StatusCode::OK);
    assert_eq!(
        send(&gate.router, get("/", "198.51.100.2")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    gate.clock.advance_ms(60_001);
    assert_eq!(send(&gate.router, get("/", "198.51.100.2")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bot_escalation_blocks_the_ip() {
    let gate = start_gate(production_config());
    let bot = || {
        request_as("GET", "/properties/7", "192.0.2.44", "Googlebot/2.1")
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..4 {
        assert_eq!(send(&gate.router, bot()).await.status(), StatusCode::OK);
    }
    let fifth = send(&gate.router, bot()).await;
    assert_eq!(fifth.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(fifth).await["message"], "Suspicious activity detected");

    let sixth = send(&gate.router, get("/properties/7", "192.0.2.44")).await;
    assert_eq!(sixth.status(), StatusCode::FORBIDDEN);
    let body = body_json(sixth).await;
    assert_eq!(body["error"], "Access Denied");
    assert_eq!(body["message"], "IP blocked");

    // The block is never consulted by the rate limiter.
    assert_eq!(gate.ctx.gate.security_stats().tracked_requests, 4);

    gate.clock.advance_ms(24 * 60 * 60 * 1000 + 1);
    assert_eq!(
        send(&gate.router, get("/properties/7", "192.0.2.44")).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_bot_signature_in_repeated_user_agent_still_counts() {
    let gate = start_gate(production_config());
    let disguised = || {
        request("GET", "/listings", "192.0.2.45")
            .header("user-agent", "SomeBot/1.0")
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..4 {
        assert_eq!(send(&gate.router, disguised()).await.status(), StatusCode::OK);
    }
    assert_eq!(gate.ctx.gate.suspicious_activity()[0].count, 4);

    let fifth = send(&gate.router, disguised()).await;
    assert_eq!(fifth.status(), StatusCode::FORBIDDEN);
    assert_eq!(gate.ctx.gate.blocked_ips()[0].ip, "192.0.2.45");
}

#[tokio::test]
async fn test_path_policy() {
    let mut config = production_config();
    config.security.path_protection.require_auth = true;
    let gate = start_gate(config);

    let response = send(&gate.router, get("/admin/dashboard", "10.1.1.1")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["message"], "Admin authentication required");

    let with_session = request("GET", "/admin/dashboard", "10.1.1.1")
        .header("cookie", "session=s3cr3t")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&gate.router, with_session).await.status(), StatusCode::OK);

    let post = request("POST", "/api/properties", "10.1.1.1").body(Body::empty()).unwrap();
    let response = send(&gate.router, post).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Invalid API access");

    let post = request("POST", "/api/properties", "10.1.1.1")
        .header("x-api-key", "k")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&gate.router, post).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_pass_through_headers() {
    let gate = start_gate(production_config());
    let response = send(&gate.router, get("/", "10.2.2.2")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers["x-response-time"].to_str().unwrap().ends_with("ms"));
    assert!(headers.contains_key("x-request-id"));

    let denied = {
        let mut config = production_config();
        config.security.ip_blacklist = vec!["10.3.3.3".into()];
        let gate = start_gate(config);
        send(&gate.router, get("/", "10.3.3.3")).await
    };
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert!(!denied.headers().contains_key("x-frame-options"));
    assert!(!denied.headers().contains_key("x-response-time"));
}

#[tokio::test]
async fn test_every_outcome_is_recorded() {
    let mut config = production_config();
    config.rate_limiting.max_requests = 1;
    let gate = start_gate(config);

    send(&gate.router, get("/listings", "10.4.4.4")).await;
    send(&gate.router, get("/listings", "10.4.4.4")).await;

    let metrics = gate.ctx.performance.get_metrics(&MetricFilter::default());
    let statuses: Vec<u16> = metrics.iter().map(|m| m.status_code).collect();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.contains(&200) && statuses.contains(&429));

    let entries = gate.ctx.audit.query(&AuditQuery::default());
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert!(actions.contains(&"security.rate_limit_exceeded"));
    assert_eq!(actions.iter().filter(|a| **a == "get._listings").count(), 2);

    let failed = gate.ctx.audit.query(&AuditQuery {
        action: Some("get._listings".into()),
        severity: Some(Severity::Medium),
        ..AuditQuery::default()
    });
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].details["statusCode"], 429);
}

#[test]
fn test_concurrent_requests_share_one_window() {
    let mut config = production_config();
    config.rate_limiting.max_requests = 100;
    let gate = start_gate(config);
    let allowed = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..25 {
                    let req = RequestInfo::new("GET", "/", "198.51.100.77");
                    if gate.ctx.gate.evaluate(&req).is_allowed() {
                        allowed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert_eq!(allowed.load(Ordering::SeqCst), 100);
}

#[tokio::test]
async fn test_served_over_tcp_with_hot_reload() {
    let config = production_config();
    let gate = start_gate(config.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let server = HttpServer::new(gate.ctx.clone());
    let handle = tokio::spawn(server.run(listener, updates_rx, shutdown.subscribe()));

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let url = format!("http://{}/listings", addr);

    let res = client.get(&url).header("user-agent", "curl/8.4").send().await.unwrap();
    assert_eq!(res.status(), 200);

    let mut strict = config;
    strict.security.user_agent_blacklist.push("curl".into());
    strict.security.escalation_threshold = 1;
    updates_tx.send(strict).unwrap();

    let mut status = 200;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let res = client.get(&url).header("user-agent", "curl/8.4").send().await.unwrap();
        status = res.status().as_u16();
        if status == 403 {
            break;
        }
    }
    assert_eq!(status, 403);
    assert_eq!(gate.ctx.gate.blocked_ips()[0].ip, "127.0.0.1");

    drop(client);
    shutdown.trigger();
    handle.await.unwrap().unwrap();
}
