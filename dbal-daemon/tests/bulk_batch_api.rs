//! Transactional bulk and batch semantics: all-or-nothing, index-citing
//! failures, order preservation.

mod common;

use common::TestApp;
use http::StatusCode;
use serde_json::json;

async fn count(app: &TestApp, path: &str) -> u64 {
    app.get(path).await.json()["data"]["total"].as_u64().unwrap()
}

#[tokio::test]
async fn bulk_create_commits_every_element() {
    let app = TestApp::new().await;
    let response = app
        .post_json(
            "/acme/forum/posts/_bulk/create",
            &json!([{"title": "a"}, {"title": "b"}, {"title": "c"}]),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["data"]["inserted"], 3);
    assert!(body["data"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .all(|doc| doc["tenantId"] == "acme"));

    assert_eq!(count(&app, "/acme/forum/posts?limit=100").await, 3);
}

#[tokio::test]
async fn bulk_create_rolls_back_on_the_failing_element() {
    let app = TestApp::new().await;
    let response = app
        .post_json(
            "/acme/forum/posts/_bulk/create",
            &json!([{"title": "a"}, {"title": "b"}, {}]),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let error = response.json()["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Bulk create failed at item 2:"), "{error}");

    // Nothing from the batch is observable.
    assert_eq!(count(&app, "/acme/forum/posts?limit=100").await, 0);
}

#[tokio::test]
async fn bulk_update_applies_in_order_and_validates_shape() {
    let app = TestApp::new().await;
    app.post_json("/acme/forum/posts", &json!({"id": "p1", "title": "a"}))
        .await;
    app.post_json("/acme/forum/posts", &json!({"id": "p2", "title": "b"}))
        .await;

    let ok = app
        .post_json(
            "/acme/forum/posts/_bulk/update",
            &json!([
                {"id": "p1", "data": {"title": "a2"}},
                {"id": "p2", "data": {"title": "b2"}},
            ]),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.json()["data"]["updated"], 2);

    let malformed = app
        .post_json("/acme/forum/posts/_bulk/update", &json!([{"id": "p1"}]))
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert!(malformed.json()["error"]
        .as_str()
        .unwrap()
        .contains("must be an object with 'id' and 'data' fields"));
}

#[tokio::test]
async fn bulk_update_failure_rolls_back_earlier_elements() {
    let app = TestApp::new().await;
    app.post_json("/acme/forum/posts", &json!({"id": "p1", "title": "a"}))
        .await;

    let response = app
        .post_json(
            "/acme/forum/posts/_bulk/update",
            &json!([
                {"id": "p1", "data": {"title": "changed"}},
                {"id": "missing", "data": {"title": "x"}},
            ]),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let unchanged = app.get("/acme/forum/posts/p1").await;
    assert_eq!(unchanged.json()["data"]["title"], "a");
}

#[tokio::test]
async fn bulk_delete_removes_all_or_nothing() {
    let app = TestApp::new().await;
    for id in ["p1", "p2"] {
        app.post_json("/acme/forum/posts", &json!({"id": id, "title": id}))
            .await;
    }

    let failing = app
        .post_json("/acme/forum/posts/_bulk/delete", &json!(["p1", "missing"]))
        .await;
    assert_eq!(failing.status, StatusCode::BAD_REQUEST);
    assert_eq!(count(&app, "/acme/forum/posts?limit=100").await, 2);

    let ok = app
        .post_json("/acme/forum/posts/_bulk/delete", &json!(["p1", "p2"]))
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.json()["data"]["ids"], json!(["p1", "p2"]));
    assert_eq!(count(&app, "/acme/forum/posts?limit=100").await, 0);
}

#[tokio::test]
async fn bulk_rejects_non_array_and_empty_bodies() {
    let app = TestApp::new().await;

    let object = app
        .post_json("/acme/forum/posts/_bulk/create", &json!({"title": "x"}))
        .await;
    assert_eq!(object.status, StatusCode::BAD_REQUEST);

    let empty = app.post_json("/acme/forum/posts/_bulk/create", &json!([])).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_mixes_entities_and_preserves_order() {
    let app = TestApp::new().await;
    app.post_json("/acme/forum/comments", &json!({"id": "c1", "body": "hi"}))
        .await;

    let response = app
        .post_json(
            "/acme/forum/_batch",
            &json!({"operations": [
                {"action": "create", "entity": "posts", "data": {"title": "t"}},
                {"action": "update", "entity": "comments", "id": "c1", "data": {"body": "edited"}},
                {"action": "delete", "entity": "comments", "id": "c1"},
            ]}),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["data"]["operations"], 3);
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results[0]["action"], "create");
    assert_eq!(results[0]["entity"], "posts");
    assert_eq!(results[0]["data"]["tenantId"], "acme");
    assert_eq!(results[1]["data"]["body"], "edited");
    assert_eq!(results[2]["deleted"], true);
}

#[tokio::test]
async fn batch_failure_hides_every_operation() {
    let app = TestApp::new().await;
    let response = app
        .post_json(
            "/acme/forum/_batch",
            &json!({"operations": [
                {"action": "create", "entity": "posts", "data": {"title": "t"}},
                {"action": "delete", "entity": "comments", "id": "nope"},
            ]}),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let error = response.json()["error"].as_str().unwrap().to_string();
    assert!(error.contains("Operation 1 (delete on comments id=nope) failed"), "{error}");

    // The created post was rolled back.
    assert_eq!(count(&app, "/acme/forum/posts?limit=100").await, 0);
}

#[tokio::test]
async fn batch_validates_the_operation_envelope() {
    let app = TestApp::new().await;

    let missing_operations = app.post_json("/acme/forum/_batch", &json!({})).await;
    assert_eq!(missing_operations.status, StatusCode::BAD_REQUEST);

    let empty = app
        .post_json("/acme/forum/_batch", &json!({"operations": []}))
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let bad_action = app
        .post_json(
            "/acme/forum/_batch",
            &json!({"operations": [{"action": "upsert", "entity": "posts"}]}),
        )
        .await;
    assert_eq!(bad_action.status, StatusCode::BAD_REQUEST);
    assert!(bad_action.json()["error"]
        .as_str()
        .unwrap()
        .contains("unsupported action 'upsert'"));

    let missing_id = app
        .post_json(
            "/acme/forum/_batch",
            &json!({"operations": [{"action": "delete", "entity": "posts", "id": ""}]}),
        )
        .await;
    assert_eq!(missing_id.status, StatusCode::BAD_REQUEST);
}
