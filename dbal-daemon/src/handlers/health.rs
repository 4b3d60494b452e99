//! Liveness and metadata endpoints.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{Method, StatusCode};
use serde_json::json;

use crate::state::AppState;
use crate::SERVICE_VERSION;

/// 204 preflight shared by the open (non-admin) endpoints.
fn open_preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            ("Access-Control-Allow-Origin", "*"),
            ("Access-Control-Allow-Methods", "GET, OPTIONS"),
        ],
    )
        .into_response()
}

pub async fn health(method: Method) -> Response {
    if method == Method::OPTIONS {
        return open_preflight();
    }
    Json(json!({ "status": "healthy", "service": "dbal" })).into_response()
}

pub async fn version(method: Method) -> Response {
    if method == Method::OPTIONS {
        return open_preflight();
    }
    Json(json!({ "version": SERVICE_VERSION, "service": "DBAL Daemon" })).into_response()
}

pub async fn status(State(state): State<AppState>, method: Method) -> Response {
    if method == Method::OPTIONS {
        return open_preflight();
    }
    Json(json!({ "status": "running", "address": state.settings.address })).into_response()
}
