//! Request handlers, one module per route family.

pub mod admin;
pub mod batch;
pub mod blob;
pub mod bulk;
pub mod entity;
pub mod health;
pub mod list;
pub mod rpc;
pub mod schema;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::StatusCode;
use serde_json::Value;

use crate::envelope;
use crate::limit::{ClientIp, RateLimiter};

/// Parse a JSON request body, falling back to an empty object.
///
/// Callers validate required fields, so a malformed body fails the same way
/// an empty one does.
pub(crate) fn parse_json_body(body: &Bytes) -> Value {
    match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(err) => {
            if !body.is_empty() {
                tracing::warn!(error = %err, "JSON parse error");
            }
            Value::Object(serde_json::Map::new())
        }
    }
}

/// Set `tenantId` on a document when the route carries a tenant and the
/// document does not already name one.
pub(crate) fn inject_tenant(data: &mut Value, tenant: &str) {
    if tenant.is_empty() {
        return;
    }
    if let Value::Object(obj) = data {
        if !obj.contains_key("tenantId") {
            obj.insert("tenantId".to_string(), Value::String(tenant.to_string()));
        }
    }
}

/// Tenant-isolation read check: a record owned by another tenant reads as
/// missing, never as forbidden.
pub(crate) fn owned_by_tenant(record: &Value, tenant: &str) -> bool {
    match record.get("tenantId") {
        Some(Value::String(owner)) => tenant.is_empty() || owner == tenant,
        _ => true,
    }
}

/// Apply one traffic-class limiter; `Some` is the empty 429 to return.
pub(crate) fn check_rate_limit(limiter: &RateLimiter, ip: &ClientIp) -> Option<Response> {
    if limiter.allow(&ip.0) {
        None
    } else {
        Some(
            Response::builder()
                .status(StatusCode::TOO_MANY_REQUESTS)
                .body(axum::body::Body::empty())
                .unwrap_or_else(|_| StatusCode::TOO_MANY_REQUESTS.into_response()),
        )
    }
}

/// The 503 every client-backed route returns when the adapter cannot be
/// initialized.
pub(crate) fn client_unavailable_response() -> Response {
    envelope::failure(
        StatusCode::SERVICE_UNAVAILABLE,
        "DBAL client is unavailable",
    )
}
