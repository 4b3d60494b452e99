//! Legacy JSON-envelope RPC endpoint.
//!
//! `POST /api/dbal` with `{entity, action, payload, options?, tenantId?}`.
//! Only the `user` entity is wired; its action module validates required
//! fields and keeps tenant checks identical to the RESTful surface.

use axum::extract::State;
use axum::response::Response;
use bytes::Bytes;
use dbal_adapters::Client;
use dbal_core::ListOptions;
use http::StatusCode;
use serde_json::{json, Map, Value};

use super::{check_rate_limit, client_unavailable_response, owned_by_tenant};
use crate::envelope;
use crate::limit::ClientIp;
use crate::state::AppState;

const MAX_REQUEST_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Actions allowed on the `user` entity, normalized to lower case.
const USER_ENTITY: &str = "user";

pub async fn handle(State(state): State<AppState>, ip: ClientIp, body: Bytes) -> Response {
    if let Some(denied) = check_rate_limit(&state.mutation_limiter, &ip) {
        return denied;
    }

    if body.len() > MAX_REQUEST_BODY_SIZE {
        return envelope::rpc_failure(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
    }

    let client = match state.ensure_client().await {
        Ok(client) => client,
        Err(_) => return client_unavailable_response(),
    };

    let request: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            return envelope::rpc_failure(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON payload: {err}"),
            )
        }
    };

    let entity = request.get("entity").and_then(Value::as_str).unwrap_or_default();
    let action = request
        .get("action")
        .or_else(|| request.get("method"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if entity.is_empty() || action.is_empty() {
        return envelope::rpc_failure(
            StatusCode::BAD_REQUEST,
            "Both entity and action are required",
        );
    }

    let normalized_entity = entity.to_ascii_lowercase();
    let action = action.to_ascii_lowercase();

    let empty = Map::new();
    let payload = request
        .get("payload")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let options = request
        .get("options")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let tenant_id = request
        .get("tenantId")
        .and_then(Value::as_str)
        .or_else(|| payload.get("tenantId").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    if normalized_entity != USER_ENTITY {
        return envelope::rpc_failure(
            StatusCode::BAD_REQUEST,
            format!("Unsupported entity: {entity}"),
        );
    }

    let id = payload.get("id").and_then(Value::as_str).unwrap_or_default();

    match action.as_str() {
        "list" => user_list(&client, &tenant_id, options).await,
        "get" | "read" => user_read(&client, &tenant_id, id).await,
        "create" => user_create(&client, &tenant_id, payload).await,
        "update" => user_update(&client, &tenant_id, id, payload).await,
        "delete" | "remove" => user_delete(&client, &tenant_id, id).await,
        other => envelope::rpc_failure(
            StatusCode::BAD_REQUEST,
            format!("Unsupported action: {other}"),
        ),
    }
}

fn rpc_success(data: Value) -> Response {
    envelope::success(data)
}

fn require_tenant(tenant_id: &str) -> Option<Response> {
    if tenant_id.is_empty() {
        Some(envelope::rpc_failure(
            StatusCode::BAD_REQUEST,
            "Tenant ID is required",
        ))
    } else {
        None
    }
}

/// Collapse free-form role strings onto the closed role set.
fn normalize_role(role: &str) -> &'static str {
    match role.to_ascii_lowercase().as_str() {
        "admin" => "admin",
        "editor" => "editor",
        "viewer" => "viewer",
        _ => "user",
    }
}

fn list_options_from_json(options: &Map<String, Value>) -> ListOptions {
    let mut parsed = ListOptions::default();
    if let Some(limit) = options.get("limit").and_then(Value::as_u64).filter(|v| *v > 0) {
        parsed.limit = limit as u32;
    }
    if let Some(page) = options.get("page").and_then(Value::as_u64).filter(|v| *v > 0) {
        parsed.page = page as u32;
    }
    for (target, key) in [("filter", "filter"), ("sort", "sort")] {
        if let Some(map) = options.get(key).and_then(Value::as_object) {
            for (field, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if target == "filter" {
                    parsed.filter.insert(field.clone(), value);
                } else {
                    parsed.sort.insert(field.clone(), value);
                }
            }
        }
    }
    parsed
}

async fn user_list(client: &Client, tenant_id: &str, options: &Map<String, Value>) -> Response {
    if let Some(denied) = require_tenant(tenant_id) {
        return denied;
    }

    let mut list_options = list_options_from_json(options);
    list_options
        .filter
        .insert("tenantId".to_string(), tenant_id.to_string());

    match client.list_entities(USER_ENTITY, &list_options).await {
        Ok(result) => rpc_success(json!({
            "data": result.items,
            "total": result.total,
            "page": result.page,
            "limit": result.limit,
        })),
        Err(err) => envelope::rpc_failure_from(&err),
    }
}

async fn user_read(client: &Client, tenant_id: &str, id: &str) -> Response {
    if let Some(denied) = require_tenant(tenant_id) {
        return denied;
    }
    if id.is_empty() {
        return envelope::rpc_failure(StatusCode::BAD_REQUEST, "ID is required for read operations");
    }

    match client.get_entity(USER_ENTITY, id).await {
        Ok(user) => {
            if !owned_by_tenant(&user, tenant_id) {
                return envelope::rpc_failure(StatusCode::NOT_FOUND, "User not found");
            }
            rpc_success(user)
        }
        Err(err) => envelope::rpc_failure_from(&err),
    }
}

async fn user_create(client: &Client, tenant_id: &str, payload: &Map<String, Value>) -> Response {
    if let Some(denied) = require_tenant(tenant_id) {
        return denied;
    }

    let username = payload.get("username").and_then(Value::as_str).unwrap_or_default();
    let email = payload.get("email").and_then(Value::as_str).unwrap_or_default();
    if username.is_empty() || email.is_empty() {
        return envelope::rpc_failure(
            StatusCode::BAD_REQUEST,
            "Username and email are required for creation",
        );
    }

    let mut user = json!({
        "username": username,
        "email": email,
        "tenantId": tenant_id,
    });
    if let Some(role) = payload.get("role").and_then(Value::as_str) {
        user["role"] = json!(normalize_role(role));
    }

    match client.create_entity(USER_ENTITY, user).await {
        Ok(created) => rpc_success(created),
        Err(err) => envelope::rpc_failure_from(&err),
    }
}

async fn user_update(
    client: &Client,
    tenant_id: &str,
    id: &str,
    payload: &Map<String, Value>,
) -> Response {
    if let Some(denied) = require_tenant(tenant_id) {
        return denied;
    }
    if id.is_empty() {
        return envelope::rpc_failure(StatusCode::BAD_REQUEST, "ID is required for updates");
    }

    let existing = match client.get_entity(USER_ENTITY, id).await {
        Ok(user) => user,
        Err(err) => return envelope::rpc_failure_from(&err),
    };
    if !owned_by_tenant(&existing, tenant_id) {
        return envelope::rpc_failure(StatusCode::NOT_FOUND, "User not found");
    }

    let mut updates = Map::new();
    for field in ["username", "email"] {
        if let Some(value) = payload.get(field).and_then(Value::as_str) {
            updates.insert(field.to_string(), json!(value));
        }
    }
    if let Some(role) = payload.get("role").and_then(Value::as_str) {
        updates.insert("role".to_string(), json!(normalize_role(role)));
    }
    if updates.is_empty() {
        return envelope::rpc_failure(
            StatusCode::BAD_REQUEST,
            "At least one update field must be provided",
        );
    }

    match client.update_entity(USER_ENTITY, id, Value::Object(updates)).await {
        Ok(updated) => rpc_success(updated),
        Err(err) => envelope::rpc_failure_from(&err),
    }
}

async fn user_delete(client: &Client, tenant_id: &str, id: &str) -> Response {
    if let Some(denied) = require_tenant(tenant_id) {
        return denied;
    }
    if id.is_empty() {
        return envelope::rpc_failure(
            StatusCode::BAD_REQUEST,
            "ID is required for delete operations",
        );
    }

    let existing = match client.get_entity(USER_ENTITY, id).await {
        Ok(user) => user,
        Err(err) => return envelope::rpc_failure_from(&err),
    };
    if !owned_by_tenant(&existing, tenant_id) {
        return envelope::rpc_failure(StatusCode::NOT_FOUND, "User not found");
    }

    match client.delete_entity(USER_ENTITY, id).await {
        Ok(deleted) => rpc_success(json!({ "deleted": deleted })),
        Err(err) => envelope::rpc_failure_from(&err),
    }
}
