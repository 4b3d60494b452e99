//! Liveness, metadata, legacy RPC, and rate-limit behavior.

mod common;

use axum::body::Body;
use common::TestApp;
use http::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn health_endpoints_answer_on_both_paths() {
    let app = TestApp::new().await;
    for path in ["/health", "/healthz"] {
        let response = app.get(path).await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "dbal");
        assert_eq!(response.headers.get("server").unwrap(), "DBAL/1.0.0");
    }
}

#[tokio::test]
async fn version_and_status_report_service_metadata() {
    let app = TestApp::new().await;

    for path in ["/version", "/api/version"] {
        let body = app.get(path).await.json();
        assert_eq!(body["version"], "1.0.0");
        assert_eq!(body["service"], "DBAL Daemon");
    }

    for path in ["/status", "/api/status"] {
        let body = app.get(path).await.json();
        assert_eq!(body["status"], "running");
        assert_eq!(body["address"], "127.0.0.1:8080");
    }
}

#[tokio::test]
async fn open_endpoints_answer_preflight_with_permissive_cors() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::OPTIONS, "/health", &[], Body::empty())
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(response.headers.get("access-control-allow-origin").unwrap(), "*");
}

#[tokio::test]
async fn rpc_user_lifecycle() {
    let app = TestApp::new().await;

    let created = app
        .post_json(
            "/api/dbal",
            &json!({
                "entity": "User",
                "action": "CREATE",
                "tenantId": "acme",
                "payload": {"username": "alice", "email": "alice@example.com", "role": "Admin"},
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::OK);
    let body = created.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["role"], "admin");
    assert_eq!(body["data"]["tenantId"], "acme");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let fetched = app
        .post_json(
            "/api/dbal",
            &json!({"entity": "user", "action": "get", "tenantId": "acme", "payload": {"id": id}}),
        )
        .await;
    assert_eq!(fetched.json()["data"]["username"], "alice");

    // Another tenant sees nothing.
    let foreign = app
        .post_json(
            "/api/dbal",
            &json!({"entity": "user", "action": "get", "tenantId": "globex", "payload": {"id": id}}),
        )
        .await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);
    assert_eq!(foreign.json()["message"], "User not found");

    let updated = app
        .post_json(
            "/api/dbal",
            &json!({
                "entity": "user",
                "action": "update",
                "tenantId": "acme",
                "payload": {"id": id, "email": "new@example.com"},
            }),
        )
        .await;
    assert_eq!(updated.json()["data"]["email"], "new@example.com");

    let listed = app
        .post_json(
            "/api/dbal",
            &json!({"entity": "user", "action": "list", "tenantId": "acme"}),
        )
        .await;
    assert_eq!(listed.json()["data"]["total"], 1);

    let deleted = app
        .post_json(
            "/api/dbal",
            &json!({"entity": "user", "action": "delete", "tenantId": "acme", "payload": {"id": id}}),
        )
        .await;
    assert_eq!(deleted.json()["data"]["deleted"], true);
}

#[tokio::test]
async fn rpc_validates_its_envelope() {
    let app = TestApp::new().await;

    let missing = app.post_json("/api/dbal", &json!({"entity": "user"})).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.json()["message"], "Both entity and action are required");

    let unsupported_entity = app
        .post_json("/api/dbal", &json!({"entity": "widget", "action": "list"}))
        .await;
    assert_eq!(unsupported_entity.status, StatusCode::BAD_REQUEST);
    assert_eq!(unsupported_entity.json()["message"], "Unsupported entity: widget");

    let unsupported_action = app
        .post_json(
            "/api/dbal",
            &json!({"entity": "user", "action": "explode", "tenantId": "acme"}),
        )
        .await;
    assert_eq!(unsupported_action.json()["message"], "Unsupported action: explode");

    let no_tenant = app
        .post_json("/api/dbal", &json!({"entity": "user", "action": "list"}))
        .await;
    assert_eq!(no_tenant.json()["message"], "Tenant ID is required");

    let missing_fields = app
        .post_json(
            "/api/dbal",
            &json!({"entity": "user", "action": "create", "tenantId": "acme", "payload": {}}),
        )
        .await;
    assert_eq!(
        missing_fields.json()["message"],
        "Username and email are required for creation"
    );
}

#[tokio::test]
async fn rpc_rejects_oversized_bodies() {
    let app = TestApp::new().await;
    let oversized = vec![b' '; 10 * 1024 * 1024 + 1];
    let response = app
        .request(
            Method::POST,
            "/api/dbal",
            &[("content-type", "application/json")],
            Body::from(oversized),
        )
        .await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json()["message"], "Request body too large");
}

#[tokio::test]
async fn read_limiter_denies_the_101st_request() {
    let app = TestApp::new().await;
    for i in 0..100 {
        let response = app.get("/a/b/c").await;
        assert_ne!(response.status, StatusCode::TOO_MANY_REQUESTS, "request {i}");
    }
    let denied = app.get("/a/b/c").await;
    assert_eq!(denied.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(denied.body.is_empty());

    // Mutations draw from a separate budget.
    let mutation = app.post_json("/a/b/c", &json!({"title": "x"})).await;
    assert_ne!(mutation.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn mutation_limiter_denies_the_51st_request() {
    let app = TestApp::new().await;
    for _ in 0..50 {
        let response = app.post_json("/a/b/c", &json!({"title": "x"})).await;
        assert_ne!(response.status, StatusCode::TOO_MANY_REQUESTS);
    }
    let denied = app.post_json("/a/b/c", &json!({"title": "x"})).await;
    assert_eq!(denied.status, StatusCode::TOO_MANY_REQUESTS);
}
