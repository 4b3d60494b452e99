//! In-process test client over the assembled router, in the style of a
//! `tower::ServiceExt::oneshot` harness.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use dbal_adapters::{Client, MemoryAdapter};
use dbal_core::ClientConfig;
use dbal_daemon::config::ServiceConfig;
use dbal_daemon::{build_router, AppState};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestApp {
    router: Router,
    pub state: AppState,
    // Keeps the schema/seed scratch space alive for the app's lifetime.
    _scratch: tempfile::TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }
}

fn service_config(
    scratch: &tempfile::TempDir,
    admin_token: Option<&str>,
    adapter: &str,
    database_url: &str,
) -> ServiceConfig {
    ServiceConfig {
        client: ClientConfig {
            adapter: adapter.to_string(),
            database_url: database_url.to_string(),
            sandbox_enabled: true,
            ..Default::default()
        },
        address: "127.0.0.1:8080".to_string(),
        admin_token: admin_token.map(str::to_string),
        cors_origin: "http://localhost:3000".to_string(),
        schema_registry_path: scratch.path().join("schema-registry.json"),
        packages_path: scratch.path().join("packages"),
        schema_output_path: scratch.path().join("generated.prisma"),
        seed_dir: Some(scratch.path().join("seeds")),
    }
}

impl TestApp {
    /// Router over a memory-adapter client, with the admin token set.
    pub async fn new() -> Self {
        Self::build(Some(ADMIN_TOKEN), "sqlite", "sqlite://:memory:").await
    }

    pub async fn without_admin_token() -> Self {
        Self::build(None, "sqlite", "sqlite://:memory:").await
    }

    /// Same harness, but the stored config names a different backend.
    pub async fn with_database_url(adapter: &str, database_url: &str) -> Self {
        Self::build(Some(ADMIN_TOKEN), adapter, database_url).await
    }

    async fn build(admin_token: Option<&str>, adapter: &str, database_url: &str) -> Self {
        let scratch = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(scratch.path().join("packages")).expect("packages dir");
        std::fs::create_dir_all(scratch.path().join("seeds")).expect("seeds dir");

        let settings = service_config(&scratch, admin_token, adapter, database_url);
        let client_config = settings.client.clone();
        let state = AppState::new(settings, Arc::new(dbal_blob::MemoryStorage::new()));
        state
            .install_client(Client::from_adapter(
                Box::new(MemoryAdapter::new()),
                client_config,
            ))
            .await;

        Self {
            router: build_router(state.clone()),
            state,
            _scratch: scratch,
        }
    }

    pub fn scratch_path(&self) -> &std::path::Path {
        self._scratch.path()
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        body: Body,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(body).expect("request build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request dispatch");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("response body")
            .to_bytes();
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, &[], Body::empty()).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> TestResponse {
        self.request(
            Method::POST,
            path,
            &[("content-type", "application/json")],
            Body::from(serde_json::to_vec(body).expect("encode body")),
        )
        .await
    }

    pub async fn put_json(&self, path: &str, body: &Value) -> TestResponse {
        self.request(
            Method::PUT,
            path,
            &[("content-type", "application/json")],
            Body::from(serde_json::to_vec(body).expect("encode body")),
        )
        .await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(Method::DELETE, path, &[], Body::empty()).await
    }

    pub async fn get_admin(&self, path: &str) -> TestResponse {
        self.request(
            Method::GET,
            path,
            &[("authorization", &format!("Bearer {ADMIN_TOKEN}"))],
            Body::empty(),
        )
        .await
    }

    pub async fn post_json_admin(&self, path: &str, body: &Value) -> TestResponse {
        self.request(
            Method::POST,
            path,
            &[
                ("content-type", "application/json"),
                ("authorization", &format!("Bearer {ADMIN_TOKEN}")),
            ],
            Body::from(serde_json::to_vec(body).expect("encode body")),
        )
        .await
    }
}
