//! Integration tests for the admission gateway.
//!
//! Each test starts a server on an ephemeral port with a manual clock and
//! drives it with reqwest. Most tests turn `--trust-proxy` on so they can pick
//! the client identity through `X-Forwarded-For`. The peer-address tests boot
//! without it, where every request comes from 127.0.0.1.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use admission_gateway::clock::ManualClock;
use admission_gateway::config::Args;
use admission_gateway::{AppState, router};
use clap::Parser;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::net::TcpListener;

struct TestServer {
    base: String,
    state: Arc<AppState>,
    clock: ManualClock,
    client: Client,
}

impl TestServer {
    async fn get(&self, path: &str, client_ip: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base))
            .header("x-forwarded-for", client_ip)
            .send()
            .await
            .unwrap()
    }
}

/// Boots a gateway that trusts `X-Forwarded-For`, plus the given flags.
async fn spawn_server(flags: &[&str]) -> TestServer {
    let mut argv = vec!["--trust-proxy"];
    argv.extend_from_slice(flags);
    spawn_server_with(&argv).await
}

/// Boots a gateway with exactly the given CLI flags.
async fn spawn_server_with(flags: &[&str]) -> TestServer {
    let mut argv = vec!["admission-gateway"];
    argv.extend_from_slice(flags);
    let args = Args::try_parse_from(argv).unwrap();

    let clock = ManualClock::new();
    let state = AppState::from_args(&args, Arc::new(clock.clone())).unwrap();
    let app = router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        state,
        clock,
        client: Client::new(),
    }
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fifty_first_request_gets_html_429() {
    let server = spawn_server(&["--rate-limit", "50", "--rate-window", "60s"]).await;

    for i in 0..50 {
        server.clock.advance(Duration::from_millis(200));
        let resp = server.get("/status", "203.0.113.7").await;
        assert_eq!(resp.status(), StatusCode::OK, "request {} was limited", i + 1);
    }

    let resp = server.get("/status", "203.0.113.7").await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    let content_type = resp.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/html"));
    assert!(resp.headers().contains_key("retry-after"));
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");

    let body = resp.text().await.unwrap();
    assert!(body.starts_with("<!DOCTYPE html>"));
    assert!(body.contains("Hey, slow down!"));
    assert!(body.contains("Rate limit exceeded, retry in"));
}

#[tokio::test]
async fn window_reset_admits_client_again() {
    let server = spawn_server(&["--rate-limit", "50", "--rate-window", "60s"]).await;

    for _ in 0..50 {
        assert_eq!(server.get("/status", "198.51.100.4").await.status(), StatusCode::OK);
    }
    assert_eq!(
        server.get("/status", "198.51.100.4").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    server.clock.advance(Duration::from_secs(61));

    let resp = server.get("/status", "198.51.100.4").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "49");

    let record = server
        .state
        .admission
        .store_for("/status")
        .peek("198.51.100.4")
        .unwrap();
    assert_eq!(record.count, 1);
}

#[tokio::test]
async fn quota_headers_count_down() {
    let server = spawn_server(&["--rate-limit", "3"]).await;

    for remaining in ["2", "1", "0"] {
        let resp = server.get("/health", "192.0.2.1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-ratelimit-limit"], "3");
        assert_eq!(resp.headers()["x-ratelimit-remaining"], remaining);
        assert_eq!(resp.headers()["x-ratelimit-reset"], "60");
    }
}

#[tokio::test]
async fn clients_have_separate_budgets() {
    let server = spawn_server(&["--rate-limit", "1"]).await;

    assert_eq!(server.get("/status", "192.0.2.10").await.status(), StatusCode::OK);
    assert_eq!(server.get("/status", "192.0.2.11").await.status(), StatusCode::OK);
    assert_eq!(
        server.get("/status", "192.0.2.10").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

// ---------------------------------------------------------------------------
// Allow-list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn allow_listed_client_is_never_limited() {
    let server = spawn_server(&["--rate-limit", "50", "--allow-list", "127.0.0.1"]).await;

    for _ in 0..1000 {
        let resp = server.get("/health", "127.0.0.1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!resp.headers().contains_key("x-ratelimit-limit"));
    }

    assert!(
        server
            .state
            .admission
            .store_for("/health")
            .peek("127.0.0.1")
            .is_none()
    );
    assert_eq!(server.state.admission.tracked_clients(), 0);
}

#[tokio::test]
async fn untrusted_forwarded_for_cannot_leave_the_allow_list() {
    // default allow-list is 127.0.0.1, the peer address of every test request
    let server = spawn_server_with(&["--rate-limit", "2"]).await;

    for spoofed in ["203.0.113.1", "203.0.113.2", "203.0.113.3", "203.0.113.4"] {
        let resp = server.get("/status", spoofed).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!resp.headers().contains_key("x-ratelimit-limit"));
    }

    assert_eq!(server.state.admission.tracked_clients(), 0);
}

#[tokio::test]
async fn untrusted_forwarded_for_is_limited_by_peer_address() {
    let server = spawn_server_with(&["--rate-limit", "1", "--allow-list", ""]).await;

    assert_eq!(server.get("/status", "203.0.113.9").await.status(), StatusCode::OK);
    // a fresh forwarded address does not buy a fresh budget
    assert_eq!(
        server.get("/status", "203.0.113.10").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    let store = server.state.admission.store_for("/status");
    assert_eq!(store.peek("127.0.0.1").unwrap().count, 2);
    assert!(store.peek("203.0.113.9").is_none());
    assert!(store.peek("203.0.113.10").is_none());
}

// ---------------------------------------------------------------------------
// Per-route limits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn route_limit_is_independent_of_global_limit() {
    let server = spawn_server(&[
        "--rate-limit",
        "5",
        "--route-limit",
        "/version=1/10s",
    ])
    .await;

    assert_eq!(server.get("/version", "192.0.2.20").await.status(), StatusCode::OK);
    assert_eq!(
        server.get("/version", "192.0.2.20").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(server.get("/status", "192.0.2.20").await.status(), StatusCode::OK);

    server.clock.advance(Duration::from_secs(10));
    assert_eq!(server.get("/version", "192.0.2.20").await.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_uses_json_error_body() {
    let server = spawn_server(&[]).await;

    let resp = server.get("/nope", "192.0.2.30").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.headers().contains_key("x-ratelimit-limit"));

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["detail"], "no route for /nope");
}

#[tokio::test]
async fn unknown_routes_are_rate_limited_too() {
    let server = spawn_server(&["--rate-limit", "1"]).await;

    assert_eq!(
        server.get("/nope", "192.0.2.31").await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        server.get("/nope", "192.0.2.31").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn version_and_status_are_not_cached() {
    let server = spawn_server(&[]).await;

    let resp = server.get("/version", "192.0.2.40").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["cache-control"], "no-store");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["api"], "v1");
    assert_eq!(body["version"]["minor"], 1);

    let resp = server.get("/status", "192.0.2.40").await;
    assert_eq!(resp.headers()["cache-control"], "no-store");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["tracked_clients"], 1);
}

#[tokio::test]
async fn metrics_endpoint_exposes_admission_counters() {
    let server = spawn_server(&["--rate-limit", "1"]).await;

    server.get("/health", "192.0.2.50").await;
    server.get("/health", "192.0.2.50").await;

    let resp = server.get("/metrics", "127.0.0.1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("admission_requests_total"));
    assert!(body.contains("admission_rejected_total"));
    assert!(body.contains("admission_store_entries"));
}

#[test]
fn invalid_configuration_refuses_to_start() {
    let args = Args::try_parse_from(["admission-gateway", "--rate-limit", "0"]).unwrap();
    let result = AppState::from_args(&args, Arc::new(ManualClock::new()));
    assert!(result.is_err());

    let args = Args::try_parse_from(["admission-gateway", "--rate-window", "0s"]).unwrap();
    let result = AppState::from_args(&args, Arc::new(ManualClock::new()));
    assert!(result.is_err());
}
