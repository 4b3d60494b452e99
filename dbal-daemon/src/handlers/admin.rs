//! Admin endpoints: runtime backend switching, adapter inventory,
//! connection testing, and seed loading. All bearer-gated.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use dbal_adapters::factory;
use http::{HeaderMap, Method, StatusCode};
use serde_json::{json, Value};

use super::{check_rate_limit, client_unavailable_response, parse_json_body};
use crate::envelope;
use crate::limit::ClientIp;
use crate::seed;
use crate::state::{redact_database_url, AppState};

/// Two gates, in order: a token must be configured (else the endpoints are
/// disabled outright), then the bearer must match exactly.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Option<Response> {
    let Some(token) = state.settings.admin_token.as_deref().filter(|t| !t.is_empty()) else {
        return Some(envelope::failure(
            StatusCode::FORBIDDEN,
            "Admin endpoints are disabled (no DBAL_ADMIN_TOKEN configured)",
        ));
    };

    let authorized = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {token}"))
        .unwrap_or(false);
    if !authorized {
        return Some(envelope::failure(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }
    None
}

/// 204 preflight reflecting only the configured origin.
fn preflight(state: &AppState, headers: &HeaderMap, methods: &'static str) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Methods", methods)
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization");

    if let Some(origin) = headers.get(http::header::ORIGIN).and_then(|v| v.to_str().ok()) {
        if origin == state.settings.cors_origin {
            builder = builder.header("Access-Control-Allow-Origin", origin);
        }
    }

    builder
        .body(axum::body::Body::empty())
        .unwrap_or_else(|_| StatusCode::NO_CONTENT.into_response())
}

fn parse_adapter_request(body: &Bytes) -> Result<(String, String), Response> {
    let parsed = match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Err(envelope::bad_request("Invalid JSON body")),
    };

    let adapter = parsed.get("adapter").and_then(Value::as_str).unwrap_or_default();
    let database_url = parsed
        .get("database_url")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if adapter.is_empty() || database_url.is_empty() {
        return Err(envelope::bad_request(
            "Both 'adapter' and 'database_url' are required",
        ));
    }
    if !factory::is_supported(adapter) {
        return Err(envelope::bad_request(format!(
            "Unsupported adapter type: {adapter}"
        )));
    }
    Ok((adapter.to_string(), database_url.to_string()))
}

/// GET/POST/OPTIONS `/admin/config`.
pub async fn config(
    State(state): State<AppState>,
    ip: ClientIp,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(denied) = check_rate_limit(&state.admin_limiter, &ip) {
        return denied;
    }
    if method == Method::OPTIONS {
        return preflight(&state, &headers, "GET, POST, OPTIONS");
    }
    if let Some(denied) = require_admin(&state, &headers) {
        return denied;
    }

    if method == Method::POST {
        let (adapter, database_url) = match parse_adapter_request(&body) {
            Ok(parsed) => parsed,
            Err(response) => return response,
        };

        tracing::info!(adapter, "admin API: switching adapter");
        if state.switch_adapter(&adapter, &database_url).await {
            Json(json!({
                "success": true,
                "message": format!("Switched to {adapter} adapter"),
            }))
            .into_response()
        } else {
            envelope::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to switch adapter - previous adapter still active",
            )
        }
    } else {
        let (adapter, database_url) = state.active_config();
        Json(json!({
            "success": true,
            "data": {
                "adapter": adapter,
                "database_url": redact_database_url(&database_url),
                "status": "connected",
            },
        }))
        .into_response()
    }
}

/// GET/OPTIONS `/admin/adapters`.
pub async fn adapters(
    State(state): State<AppState>,
    ip: ClientIp,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = check_rate_limit(&state.admin_limiter, &ip) {
        return denied;
    }
    if method == Method::OPTIONS {
        return preflight(&state, &headers, "GET, OPTIONS");
    }
    if let Some(denied) = require_admin(&state, &headers) {
        return denied;
    }

    let (active, _) = state.active_config();
    let adapters: Vec<Value> = factory::SUPPORTED_ADAPTERS
        .iter()
        .map(|(name, description)| {
            json!({
                "name": name,
                "description": description,
                "supported": factory::is_supported(name),
                "active": *name == active,
            })
        })
        .collect();

    Json(json!({ "success": true, "data": adapters })).into_response()
}

/// POST/OPTIONS `/admin/test-connection`.
pub async fn test_connection(
    State(state): State<AppState>,
    ip: ClientIp,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(denied) = check_rate_limit(&state.admin_limiter, &ip) {
        return denied;
    }
    if method == Method::OPTIONS {
        return preflight(&state, &headers, "POST, OPTIONS");
    }
    if let Some(denied) = require_admin(&state, &headers) {
        return denied;
    }

    let (adapter, database_url) = match parse_adapter_request(&body) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    match state.test_connection(&adapter, &database_url).await {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("Connection to {adapter} succeeded"),
        }))
        .into_response(),
        Err(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "success": false, "error": err.to_string() })),
        )
            .into_response(),
    }
}

/// POST/OPTIONS `/admin/seed` — load YAML seed data through the client.
pub async fn seed(
    State(state): State<AppState>,
    ip: ClientIp,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(denied) = check_rate_limit(&state.admin_limiter, &ip) {
        return denied;
    }
    if method == Method::OPTIONS {
        return preflight(&state, &headers, "POST, OPTIONS");
    }
    if let Some(denied) = require_admin(&state, &headers) {
        return denied;
    }

    let client = match state.ensure_client().await {
        Ok(client) => client,
        Err(_) => return client_unavailable_response(),
    };

    let parsed = parse_json_body(&body);
    let force = parsed.get("force").and_then(Value::as_bool).unwrap_or(false);
    let seed_dir = parsed
        .get("seed_dir")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(std::path::PathBuf::from)
        .or_else(|| state.settings.seed_dir.clone())
        .unwrap_or_else(seed::default_seed_dir);

    tracing::info!(dir = %seed_dir.display(), force, "admin API: seed request");
    let summary = seed::load_seeds(&client, &seed_dir, force).await;

    let status = if !summary.success && summary.total_inserted == 0 && summary.total_failed > 0 {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    let mut response = json!({
        "success": summary.success,
        "data": {
            "total_inserted": summary.total_inserted,
            "total_skipped": summary.total_skipped,
            "total_failed": summary.total_failed,
            "seed_dir": seed_dir.display().to_string(),
            "force": force,
            "results": summary.results.iter().map(|r| json!({
                "entity": r.entity,
                "inserted": r.inserted,
                "skipped": r.skipped,
                "failed": r.failed,
                "errors": r.errors,
            })).collect::<Vec<_>>(),
        },
    });
    if !summary.errors.is_empty() {
        response["errors"] = json!(summary.errors);
    }

    (status, Json(response)).into_response()
}
