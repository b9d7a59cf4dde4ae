//! The HTTP shim driven in-process through the router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use packet_secrets::api::{build_router, ApiState};
use packet_secrets::backend::{Backend, LeaseSettings};
use packet_secrets::provider::{MockFailure, MockProvider};
use packet_secrets::storage::InMemoryStorage;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Router, MockProvider) {
    let provider = MockProvider::new();
    let backend = Backend::new(
        Arc::new(InMemoryStorage::new()),
        Arc::new(provider.factory()),
        LeaseSettings::default(),
    );
    let router = build_router(ApiState::new(Arc::new(backend), Duration::from_secs(30)));
    (router, provider)
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

async fn configured_app() -> (Router, MockProvider) {
    let (router, provider) = app();
    let (status, _) =
        send(&router, Method::PUT, "/v1/packet/config", Some(json!({ "api_token": "T1" }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(
        &router,
        Method::PUT,
        "/v1/packet/roles/readonly",
        Some(json!({ "ttl": "10m", "max_ttl": "1h" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    (router, provider)
}

#[tokio::test]
async fn health_and_help() {
    let (router, _) = app();

    let (status, body) = send(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&router, Method::GET, "/v1/packet/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["help"].as_str().is_some_and(|help| help.contains("Packet")));
}

#[tokio::test]
async fn config_read_never_returns_token() {
    let (router, _) = app();

    let (status, body) = send(&router, Method::GET, "/v1/packet/config", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    send(
        &router,
        Method::POST,
        "/v1/packet/config",
        Some(json!({ "api_token": "super-secret", "api_url": "https://api.example.test" })),
    )
    .await;

    let (status, body) = send(&router, Method::GET, "/v1/packet/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["api_token_set"], true);
    assert_eq!(body["data"]["api_url"], "https://api.example.test");
    assert!(!body.to_string().contains("super-secret"));
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let (router, _) = app();

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/v1/packet/config")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = send(&router, Method::PUT, "/v1/packet/config", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (status, _) = send(&router, Method::PUT, "/v1/packet/config", Some(json!(["T1"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn typed_bodies_report_errors_as_json() {
    let (router, _) = configured_app().await;

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/v1/packet/leases/revoke")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{bad"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "bad_request");

    let (status, body) = send(&router, Method::PUT, "/v1/packet/leases/revoke", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert!(body["message"].as_str().is_some_and(|message| message.contains("lease")));

    let (status, body) = send(
        &router,
        Method::PUT,
        "/v1/packet/leases/renew",
        Some(json!({ "lease": "not-a-lease" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = send(&router, Method::POST, "/v1/packet/invalidate", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    // Missing content type is accepted like the other endpoints
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/packet/invalidate")
        .body(Body::from(json!({ "key": "config" }).to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn role_endpoints() {
    let (router, _) = configured_app().await;

    let (status, body) = send(&router, Method::GET, "/v1/packet/roles/readonly", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ttl"], 600);
    assert_eq!(body["data"]["max_ttl"], 3600);

    let (status, body) = send(&router, Method::GET, "/v1/packet/roles", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["keys"], json!(["readonly"]));

    let (status, _) = send(&router, Method::DELETE, "/v1/packet/roles/readonly", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&router, Method::GET, "/v1/packet/roles/readonly", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn issue_renew_revoke_over_http() {
    let (router, provider) = configured_app().await;

    let (status, body) = send(&router, Method::GET, "/v1/packet/creds/readonly?ttl=5m", None).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["data"]["api_key_id"].as_str().unwrap().to_string();
    assert!(body["data"]["api_key_token"].as_str().is_some());
    assert_eq!(body["secret"]["ttl"], 300);
    assert_eq!(body["secret"]["max_ttl"], 3600);
    assert!(provider.contains_key(&id));

    let lease = body["secret"].clone();
    let (status, body) = send(
        &router,
        Method::PUT,
        "/v1/packet/leases/renew",
        Some(json!({ "lease": lease, "increment": "20m" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lease"]["ttl"], 1200);

    let (status, _) =
        send(&router, Method::PUT, "/v1/packet/leases/revoke", Some(json!({ "lease": lease }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!provider.contains_key(&id));

    let (status, _) =
        send(&router, Method::PUT, "/v1/packet/leases/revoke", Some(json!({ "lease": lease }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) =
        send(&router, Method::PUT, "/v1/packet/leases/renew", Some(json!({ "lease": lease }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "not_renewable");
}

#[tokio::test]
async fn issuance_errors_map_to_statuses() {
    let (router, provider) = app();

    let (status, body) = send(&router, Method::PUT, "/v1/packet/roles/readonly", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT, "{body}");

    let (status, body) = send(&router, Method::POST, "/v1/packet/creds/readonly", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "not_configured");

    send(&router, Method::PUT, "/v1/packet/config", Some(json!({ "api_token": "T1" }))).await;

    let (status, body) = send(&router, Method::GET, "/v1/packet/creds/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "role_not_found");

    provider.fail_next(MockFailure::Unavailable);
    let (status, body) = send(&router, Method::GET, "/v1/packet/creds/readonly", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "provider_unavailable");

    provider.fail_next(MockFailure::Auth);
    let (status, _) = send(&router, Method::GET, "/v1/packet/creds/readonly", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, _) = send(&router, Method::GET, "/v1/packet/creds/readonly?ttl=soon", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(provider.key_count(), 0);
}

#[tokio::test]
async fn invalidate_drops_cached_client() {
    let (router, provider) = configured_app().await;

    send(&router, Method::GET, "/v1/packet/creds/readonly", None).await;
    send(&router, Method::GET, "/v1/packet/creds/readonly", None).await;
    assert_eq!(provider.builds(), 1);

    let (status, _) =
        send(&router, Method::POST, "/v1/packet/invalidate", Some(json!({ "key": "config" }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    send(&router, Method::GET, "/v1/packet/creds/readonly", None).await;
    assert_eq!(provider.builds(), 2);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (router, _) = app();
    let (status, _) = send(&router, Method::GET, "/v1/packet/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
