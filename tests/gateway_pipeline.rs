//! Pipeline ordering and rejection tests, driven through the router directly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use serde_json::Value;
use strategy_gateway::config::GatewayConfig;
use strategy_gateway::HttpServer;
use tower::ServiceExt;

mod common;

/// Backend that counts hits and records every request head.
async fn recording_backend() -> (std::net::SocketAddr, Arc<AtomicU32>, Arc<Mutex<Vec<String>>>) {
    let hits = Arc::new(AtomicU32::new(0));
    let heads = Arc::new(Mutex::new(Vec::new()));
    let (h, r) = (hits.clone(), heads.clone());
    let addr = common::start_programmable_backend(move |head| {
        h.fetch_add(1, Ordering::SeqCst);
        r.lock().unwrap().push(head);
        async move { (200, r#"{"ok":true}"#.to_string()) }
    })
    .await;
    (addr, hits, heads)
}

fn router(config: GatewayConfig) -> Router {
    HttpServer::new(config).unwrap().router()
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method(Method::GET).uri(uri)
}

#[tokio::test]
async fn test_unknown_service_is_404_regardless_of_limits() {
    let (backend, hits, _) = recording_backend().await;
    let mut config = common::gateway_config(backend);
    config.rate_limit.general.max_requests = 1;
    let app = router(config);

    for _ in 0..3 {
        let res = send(&app, get("/api/gateway/billing/invoices").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = json_body(res).await;
        assert_eq!(body["error"], "unknown_service");
        assert_eq!(body["available_services"], serde_json::json!(["intake"]));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // The limiter was never charged for the unknown-service calls.
    let res = send(
        &app,
        get("/api/gateway/intake/forms")
            .header("x-api-key", common::API_KEY)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_path_without_credentials_is_401() {
    let (backend, hits, _) = recording_backend().await;
    let app = router(common::gateway_config(backend));

    let res = send(&app, get("/api/gateway/intake/forms").body(Body::empty()).unwrap()).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().contains_key("x-gateway-request-id"));
    let body = json_body(res).await;
    assert_eq!(body["error"], "authentication_failed");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_public_path_skips_authentication() {
    let (backend, hits, _) = recording_backend().await;
    let app = router(common::gateway_config(backend));

    let res = send(&app, get("/api/gateway/intake/health").body(Body::empty()).unwrap()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_api_key_request_is_forwarded_and_decorated() {
    let (backend, hits, heads) = recording_backend().await;
    let app = router(common::gateway_config(backend));

    let res = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/api/gateway/intake/forms?draft=1")
            .header("x-api-key", common::API_KEY)
            .header("x-request-id", "req-123")
            .header("x-correlation-id", "corr-456")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"spring campaign"}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::OK);
    let h = res.headers();
    assert_eq!(h["x-gateway-request-id"], "req-123");
    assert_eq!(h["x-gateway-correlation-id"], "corr-456");
    assert_eq!(h["x-gateway-service"], "intake");
    assert!(h["x-gateway-response-time"].to_str().unwrap().ends_with("ms"));
    assert_eq!(h["access-control-allow-origin"], "*");
    assert_eq!(h["x-ratelimit-limit"], "100");
    assert_eq!(h["x-ratelimit-remaining"], "99");
    assert!(h.contains_key("x-ratelimit-reset"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let head = heads.lock().unwrap()[0].clone();
    assert!(head.starts_with("post /forms?draft=1 "));
    assert!(head.contains("x-request-id: req-123"));
    assert!(head.contains("x-correlation-id: corr-456"));
    assert!(head.contains("x-user-id: integration-suite"));
    assert!(head.contains("x-gateway-service: intake"));
}

#[tokio::test]
async fn test_rate_limit_rejects_before_auth() {
    let (backend, hits, _) = recording_backend().await;
    let mut config = common::gateway_config(backend);
    config.rate_limit.general.max_requests = 2;
    let app = router(config);

    for expected_remaining in ["1", "0"] {
        let res = send(
            &app,
            get("/api/gateway/intake/forms")
                .header("x-api-key", common::API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    // Bad credentials still get 429, not 401: the limiter runs first.
    let res = send(
        &app,
        get("/api/gateway/intake/forms")
            .header("x-api-key", "wrong")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key("retry-after"));
    assert_eq!(res.headers()["x-ratelimit-remaining"], "0");
    let body = json_body(res).await;
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert_eq!(body["limit"], 2);
    assert!(body["resetTime"].as_u64().is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_bearer_and_cookie_tokens() {
    let (backend, _, heads) = recording_backend().await;
    let app = router(common::gateway_config(backend));

    let bearer = common::token("user-7", &[], 300);
    let res = send(
        &app,
        get("/api/gateway/intake/forms")
            .header("authorization", format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(heads.lock().unwrap()[0].contains("x-user-id: user-7"));

    let session = common::token("user-8", &[], 300);
    let res = send(
        &app,
        get("/api/gateway/intake/forms")
            .header("cookie", format!("session={session}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let expired = common::token("user-9", &[], -300);
    let res = send(
        &app,
        get("/api/gateway/intake/forms")
            .header("authorization", format!("Bearer {expired}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(res).await;
    assert_eq!(body["message"], "authentication failed: token expired");
}

#[tokio::test]
async fn test_missing_permission_is_403() {
    let (backend, hits, _) = recording_backend().await;
    let mut config = common::gateway_config(backend);
    config.services[0].required_permissions = vec!["intake:write".into()];
    let app = router(config);

    let reader = common::token("reader", &["intake:read"], 300);
    let res = send(
        &app,
        get("/api/gateway/intake/forms")
            .header("authorization", format!("Bearer {reader}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(res).await["required_permission"], "intake:write");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // The API key principal holds the permission.
    let res = send(
        &app,
        get("/api/gateway/intake/forms")
            .header("x-api-key", common::API_KEY)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_preflight_is_answered_by_gateway() {
    let (backend, hits, _) = recording_backend().await;
    let app = router(common::gateway_config(backend));

    let res = send(
        &app,
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/gateway/intake/forms")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res.headers().contains_key("access-control-allow-methods"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_health_and_service_listing() {
    let (backend, _, _) = recording_backend().await;
    let app = router(common::gateway_config(backend));

    let res = send(&app, get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["services"][0]["name"], "intake");
    assert_eq!(body["services"][0]["breaker"]["status"], "closed");

    let res = send(&app, get("/api/gateway").body(Body::empty()).unwrap()).await;
    assert_eq!(json_body(res).await["available_services"][0], "intake");

    let res = send(&app, get("/nowhere").body(Body::empty()).unwrap()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_trailing_slash_after_service_is_forwarded() {
    let (backend, hits, heads) = recording_backend().await;
    let app = router(common::gateway_config(backend));

    let res = send(
        &app,
        get("/api/gateway/intake/")
            .header("x-api-key", common::API_KEY)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-gateway-service"], "intake");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(heads.lock().unwrap()[0].starts_with("get / "));

    let res = send(&app, get("/api/gateway/billing/").body(Body::empty()).unwrap()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(res).await["error"], "unknown_service");
}
