//! Generic entity surface: CRUD, tenant isolation, list queries, dispatch.

mod common;

use common::TestApp;
use http::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn create_injects_tenant_and_read_returns_the_document() {
    let app = TestApp::new().await;

    let created = app
        .post_json("/acme/forum/posts", &json!({"title": "x"}))
        .await;
    assert_eq!(created.status, StatusCode::OK);
    let body = created.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["tenantId"], "acme");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let fetched = app.get(&format!("/acme/forum/posts/{id}")).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.json()["data"]["title"], "x");
    assert_eq!(
        fetched.headers.get("server").unwrap().to_str().unwrap(),
        "DBAL/1.0.0"
    );
}

#[tokio::test]
async fn caller_supplied_tenant_is_not_overwritten() {
    let app = TestApp::new().await;
    let created = app
        .post_json("/acme/forum/posts", &json!({"title": "x", "tenantId": "custom"}))
        .await;
    assert_eq!(created.json()["data"]["tenantId"], "custom");
}

#[tokio::test]
async fn cross_tenant_read_is_not_found() {
    let app = TestApp::new().await;
    let created = app
        .post_json("/acme/forum/posts", &json!({"title": "x"}))
        .await;
    let id = created.json()["data"]["id"].as_str().unwrap().to_string();

    let other = app.get(&format!("/other/forum/posts/{id}")).await;
    assert_eq!(other.status, StatusCode::NOT_FOUND);
    assert_eq!(other.json()["error"], "posts not found");
}

#[tokio::test]
async fn update_and_delete_enforce_tenant_ownership() {
    let app = TestApp::new().await;
    let created = app
        .post_json("/acme/forum/posts", &json!({"title": "x"}))
        .await;
    let id = created.json()["data"]["id"].as_str().unwrap().to_string();

    let foreign_update = app
        .put_json(&format!("/other/forum/posts/{id}"), &json!({"title": "hacked"}))
        .await;
    assert_eq!(foreign_update.status, StatusCode::NOT_FOUND);

    let foreign_delete = app.delete(&format!("/other/forum/posts/{id}")).await;
    assert_eq!(foreign_delete.status, StatusCode::NOT_FOUND);

    // The record is untouched for its owner.
    let fetched = app.get(&format!("/acme/forum/posts/{id}")).await;
    assert_eq!(fetched.json()["data"]["title"], "x");

    let owner_update = app
        .put_json(&format!("/acme/forum/posts/{id}"), &json!({"title": "y"}))
        .await;
    assert_eq!(owner_update.status, StatusCode::OK);

    let owner_delete = app.delete(&format!("/acme/forum/posts/{id}")).await;
    assert_eq!(owner_delete.status, StatusCode::OK);
    assert_eq!(owner_delete.json()["data"]["deleted"], true);
}

#[tokio::test]
async fn update_is_idempotent_at_the_envelope_level() {
    let app = TestApp::new().await;
    let created = app
        .post_json("/acme/forum/posts", &json!({"title": "x"}))
        .await;
    let id = created.json()["data"]["id"].as_str().unwrap().to_string();

    let first = app
        .put_json(&format!("/acme/forum/posts/{id}"), &json!({"title": "y"}))
        .await;
    let second = app
        .put_json(&format!("/acme/forum/posts/{id}"), &json!({"title": "y"}))
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.json(), second.json());
}

#[tokio::test]
async fn empty_update_body_is_a_400() {
    let app = TestApp::new().await;
    let created = app
        .post_json("/acme/forum/posts", &json!({"title": "x"}))
        .await;
    let id = created.json()["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .put_json(&format!("/acme/forum/posts/{id}"), &json!({}))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json()["error"],
        "At least one update field must be provided"
    );
}

#[tokio::test]
async fn post_with_id_suggests_put() {
    let app = TestApp::new().await;
    let response = app
        .post_json("/acme/forum/posts/some_id", &json!({"title": "x"}))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json()["error"],
        "POST with a resource ID is not supported; use PUT/PATCH"
    );
}

#[tokio::test]
async fn list_is_tenant_scoped_and_paginated() {
    let app = TestApp::new().await;
    for i in 0..3 {
        app.post_json("/acme/forum/posts", &json!({"title": format!("a{i}"), "rank": i}))
            .await;
    }
    app.post_json("/globex/forum/posts", &json!({"title": "other"}))
        .await;

    let listed = app.get("/acme/forum/posts?limit=2&sort.rank=desc").await;
    assert_eq!(listed.status, StatusCode::OK);
    let data = listed.json();
    assert_eq!(data["data"]["total"], 3);
    assert_eq!(data["data"]["limit"], 2);
    let items = data["data"]["data"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["rank"], 2);
    assert!(items.iter().all(|item| item["tenantId"] == "acme"));
}

#[tokio::test]
async fn list_filter_params_narrow_results() {
    let app = TestApp::new().await;
    app.post_json("/acme/forum/posts", &json!({"title": "a", "status": "open"}))
        .await;
    app.post_json("/acme/forum/posts", &json!({"title": "b", "status": "closed"}))
        .await;

    let listed = app.get("/acme/forum/posts?filter.status=open").await;
    let data = listed.json();
    assert_eq!(data["data"]["total"], 1);
    assert_eq!(data["data"]["data"][0]["title"], "a");
}

#[tokio::test]
async fn invalid_list_parameters_are_rejected() {
    let app = TestApp::new().await;
    for query in ["limit=0", "limit=-3", "limit=abc", "page=0", "offset=-1"] {
        let response = app.get(&format!("/acme/forum/posts?{query}")).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "query {query}");
    }
}

#[tokio::test]
async fn reserved_tenant_names_are_rejected() {
    let app = TestApp::new().await;
    let response = app.get("/invalid/forum/posts").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "Invalid tenant name: invalid");
}

#[tokio::test]
async fn custom_actions_are_reserved() {
    let app = TestApp::new().await;
    let response = app.get("/acme/forum/posts/p1/publish").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["error"], "Custom actions are not supported yet");
}

#[tokio::test]
async fn unknown_methods_on_the_item_route_are_405() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::OPTIONS, "/acme/forum/posts/p1", &[], axum::body::Body::empty())
        .await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}
