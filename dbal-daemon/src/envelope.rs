//! Uniform response envelopes.
//!
//! Success bodies are `{"success":true,"data":...}`; error bodies are
//! `{"success":false,"error":...}` except on the blob surface, which uses
//! `{"error":{"code","message"}}`, and the legacy RPC surface, which uses
//! `{"success":false,"message":...}`. The `Server: DBAL/1.0.0` header is
//! stamped by a response layer in the router.

use axum::response::{IntoResponse, Response};
use axum::Json;
use dbal_core::Error;
use http::StatusCode;
use serde_json::{json, Value};

pub const SERVER_HEADER: &str = "DBAL/1.0.0";

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// 200 with the standard success envelope.
pub fn success(data: Value) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
}

/// `{"success":false,"error":message}` with an explicit status.
pub fn failure(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(json!({ "success": false, "error": message.into() }))).into_response()
}

/// Handler-level 400, the most common validation failure.
pub fn bad_request(message: impl Into<String>) -> Response {
    failure(StatusCode::BAD_REQUEST, message)
}

/// Map a domain error onto the standard envelope.
pub fn failure_from(err: &Error) -> Response {
    failure(status(err.http_status()), err.to_string())
}

/// Blob envelope: `{"error":{"code","message"}}`.
pub fn blob_failure(err: &Error) -> Response {
    blob_failure_with(status(err.http_status()), err.code(), &err.to_string())
}

pub fn blob_failure_with(code: StatusCode, tag: &str, message: &str) -> Response {
    (
        code,
        Json(json!({ "error": { "code": tag, "message": message } })),
    )
        .into_response()
}

/// Legacy RPC envelope keeps its historical `message` key.
pub fn rpc_failure(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(json!({ "success": false, "message": message.into() }))).into_response()
}

pub fn rpc_failure_from(err: &Error) -> Response {
    rpc_failure(status(err.http_status()), err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_pick_their_status() {
        let resp = failure_from(&Error::NotFound("posts not found".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = failure_from(&Error::Database("down".into()));
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn blob_failure_carries_code_tag() {
        let resp = blob_failure(&Error::CapabilityNotSupported("no presign".into()));
        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
