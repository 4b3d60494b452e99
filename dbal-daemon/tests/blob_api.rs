//! Blob surface: round trips, tenant key isolation, metadata, actions.

mod common;

use axum::body::Body;
use common::TestApp;
use http::{Method, StatusCode};
use serde_json::json;

async fn put_blob(app: &TestApp, path: &str, body: &'static [u8], headers: &[(&str, &str)]) -> common::TestResponse {
    app.request(Method::PUT, path, headers, Body::from(body)).await
}

#[tokio::test]
async fn upload_download_head_round_trip() {
    let app = TestApp::new().await;

    let uploaded = put_blob(
        &app,
        "/acme/forum/blob/x.bin",
        &[0xDE, 0xAD, 0xBE, 0xEF],
        &[("content-type", "application/pdf")],
    )
    .await;
    assert_eq!(uploaded.status, StatusCode::CREATED);
    let meta = uploaded.json();
    assert_eq!(meta["key"], "x.bin");
    assert_eq!(meta["size"], 4);
    assert_eq!(meta["contentType"], "application/pdf");

    let downloaded = app.get("/acme/forum/blob/x.bin").await;
    assert_eq!(downloaded.status, StatusCode::OK);
    assert_eq!(&downloaded.body[..], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(
        downloaded.headers.get("content-type").unwrap(),
        "application/pdf"
    );

    let head = app
        .request(Method::HEAD, "/acme/forum/blob/x.bin", &[], Body::empty())
        .await;
    assert_eq!(head.status, StatusCode::OK);
    assert_eq!(head.headers.get("content-length").unwrap(), "4");
    assert_eq!(head.headers.get("content-type").unwrap(), "application/pdf");
    assert!(head.headers.contains_key("etag"));
    assert!(head.headers.contains_key("last-modified"));
}

#[tokio::test]
async fn tenants_cannot_see_each_others_keys() {
    let app = TestApp::new().await;
    put_blob(&app, "/acme/forum/blob/x.bin", b"payload", &[]).await;

    let other_tenant = app.get("/other/forum/blob/x.bin").await;
    assert_eq!(other_tenant.status, StatusCode::NOT_FOUND);
    assert_eq!(other_tenant.json()["error"]["code"], "NOT_FOUND");

    let other_package = app.get("/acme/wiki/blob/x.bin").await;
    assert_eq!(other_package.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn custom_metadata_survives_upload_and_head() {
    let app = TestApp::new().await;
    put_blob(
        &app,
        "/acme/forum/blob/tagged",
        b"x",
        &[("x-blob-metadata", r#"{"owner":"alice","kind":"report"}"#)],
    )
    .await;

    let head = app
        .request(Method::HEAD, "/acme/forum/blob/tagged", &[], Body::empty())
        .await;
    let meta: serde_json::Value =
        serde_json::from_str(head.headers.get("x-blob-metadata").unwrap().to_str().unwrap())
            .unwrap();
    assert_eq!(meta["owner"], "alice");
    assert_eq!(meta["kind"], "report");
}

#[tokio::test]
async fn overwrite_header_false_yields_conflict() {
    let app = TestApp::new().await;
    put_blob(&app, "/acme/forum/blob/once", b"a", &[]).await;

    let denied = put_blob(
        &app,
        "/acme/forum/blob/once",
        b"b",
        &[("x-blob-overwrite", "false")],
    )
    .await;
    assert_eq!(denied.status, StatusCode::CONFLICT);
    assert_eq!(denied.json()["error"]["code"], "CONFLICT");

    let allowed = put_blob(
        &app,
        "/acme/forum/blob/once",
        b"b",
        &[("x-blob-overwrite", "true")],
    )
    .await;
    assert_eq!(allowed.status, StatusCode::CREATED);
}

#[tokio::test]
async fn list_strips_the_tenant_prefix() {
    let app = TestApp::new().await;
    put_blob(&app, "/acme/forum/blob/reports_2024", b"1", &[]).await;
    put_blob(&app, "/acme/forum/blob/reports_2025", b"2", &[]).await;
    put_blob(&app, "/acme/forum/blob/misc", b"3", &[]).await;
    put_blob(&app, "/globex/forum/blob/reports_2024", b"4", &[]).await;

    let listed = app.get("/acme/forum/blob?prefix=reports_").await;
    assert_eq!(listed.status, StatusCode::OK);
    let body = listed.json();
    let keys: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["reports_2024", "reports_2025"]);
    assert_eq!(body["isTruncated"], false);
    assert_eq!(body["nextToken"], serde_json::Value::Null);
}

#[tokio::test]
async fn stats_aggregate_size_and_count() {
    let app = TestApp::new().await;
    put_blob(&app, "/acme/forum/blob/a", b"12345", &[]).await;
    put_blob(&app, "/acme/forum/blob/b", b"123", &[]).await;

    let stats = app.get("/acme/forum/blob/_stats").await;
    assert_eq!(stats.status, StatusCode::OK);
    let body = stats.json();
    assert_eq!(body["totalSize"], 8);
    assert_eq!(body["objectCount"], 2);
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn copy_creates_a_sibling_in_the_same_bucket() {
    let app = TestApp::new().await;
    put_blob(&app, "/acme/forum/blob/src", b"payload", &[]).await;

    let copied = app
        .post_json("/acme/forum/blob/src/copy", &json!({"destKey": "dst"}))
        .await;
    assert_eq!(copied.status, StatusCode::OK);
    assert_eq!(copied.json()["key"], "dst");

    let fetched = app.get("/acme/forum/blob/dst").await;
    assert_eq!(&fetched.body[..], b"payload");

    let missing_dest = app
        .post_json("/acme/forum/blob/src/copy", &json!({}))
        .await;
    assert_eq!(missing_dest.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(missing_dest.json()["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn presign_is_not_supported_on_the_memory_backend() {
    let app = TestApp::new().await;
    put_blob(&app, "/acme/forum/blob/x", b"1", &[]).await;

    let response = app.get("/acme/forum/blob/x/presign?expires=60").await;
    assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(response.json()["error"]["code"], "NOT_SUPPORTED");
}

#[tokio::test]
async fn delete_removes_the_object() {
    let app = TestApp::new().await;
    put_blob(&app, "/acme/forum/blob/x", b"1", &[]).await;

    let deleted = app.delete("/acme/forum/blob/x").await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.json()["deleted"], true);

    assert_eq!(app.get("/acme/forum/blob/x").await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.delete("/acme/forum/blob/x").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_blob_action_is_not_found() {
    let app = TestApp::new().await;
    let response = app.get("/acme/forum/blob/x/unknown_action").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["error"]["code"], "NOT_FOUND");
}
