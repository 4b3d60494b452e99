//! Multi-entity transactional batch endpoint.
//!
//! One request mixes create/update/delete operations across entities of the
//! same `{tenant, package}`. The transaction lifecycle matches bulk:
//! all-or-nothing, with the first failure naming the offending operation
//! index and entity. Results preserve the submitted order.

use axum::extract::{Path, State};
use axum::response::Response;
use bytes::Bytes;
use dbal_adapters::Client;
use http::StatusCode;
use serde_json::{json, Map, Value};

use super::{check_rate_limit, client_unavailable_response, inject_tenant, parse_json_body};
use crate::envelope;
use crate::limit::ClientIp;
use crate::state::AppState;

/// POST `/{tenant}/{package}/_batch`.
pub async fn handle(
    State(state): State<AppState>,
    ip: ClientIp,
    Path((tenant, _package)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    if let Some(denied) = check_rate_limit(&state.mutation_limiter, &ip) {
        return denied;
    }
    let client = match state.ensure_client().await {
        Ok(client) => client,
        Err(_) => return client_unavailable_response(),
    };

    let body = parse_json_body(&body);
    let Some(operations) = body.get("operations").and_then(Value::as_array) else {
        return envelope::bad_request("Request body must contain an 'operations' array");
    };
    if operations.is_empty() {
        return envelope::bad_request("Operations array must not be empty");
    }

    if let Err(err) = client.begin_transaction().await {
        tracing::error!(error = %err, "batch begin_transaction failed");
        return envelope::failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to begin transaction");
    }

    let mut results = Vec::with_capacity(operations.len());
    for (index, operation) in operations.iter().enumerate() {
        match apply_operation(&client, &tenant, index, operation).await {
            Ok(result) => results.push(result),
            Err(response) => {
                if let Err(err) = client.rollback_transaction().await {
                    tracing::warn!(error = %err, "batch rollback failed");
                }
                return response;
            }
        }
    }

    if let Err(err) = client.commit_transaction().await {
        tracing::error!(error = %err, "batch commit failed");
        return envelope::failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to commit transaction");
    }

    envelope::success(json!({
        "success": true,
        "operations": results.len(),
        "results": results,
    }))
}

/// Run one operation; `Err` carries the ready-to-send failure response.
async fn apply_operation(
    client: &Client,
    tenant: &str,
    index: usize,
    operation: &Value,
) -> Result<Value, Response> {
    let Some(op) = operation.as_object() else {
        return Err(envelope::bad_request(format!(
            "Operation {index} must be an object"
        )));
    };

    let action = require_string(op, "action")
        .ok_or_else(|| envelope::bad_request(format!("Operation {index} missing required 'action' field")))?;
    let entity = require_string(op, "entity")
        .ok_or_else(|| envelope::bad_request(format!("Operation {index} missing required 'entity' field")))?;

    let mut result = json!({
        "operation": index,
        "action": action,
        "entity": entity,
    });

    match action {
        "create" => {
            let Some(data) = op.get("data").filter(|d| d.is_object()) else {
                return Err(envelope::bad_request(format!(
                    "Operation {index} (create): missing required 'data' object"
                )));
            };
            let mut data = data.clone();
            inject_tenant(&mut data, tenant);

            let created = client.create_entity(entity, data).await.map_err(|err| {
                envelope::failure(
                    StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    format!("Operation {index} (create on {entity}) failed: {err}"),
                )
            })?;
            result["data"] = created;
        }
        "update" => {
            let id = non_empty_string(op, "id").ok_or_else(|| {
                envelope::bad_request(format!("Operation {index} (update): missing required 'id' field"))
            })?;
            let Some(data) = op.get("data").filter(|d| d.is_object()) else {
                return Err(envelope::bad_request(format!(
                    "Operation {index} (update): missing required 'data' object"
                )));
            };

            let updated = client
                .update_entity(entity, id, data.clone())
                .await
                .map_err(|err| {
                    envelope::failure(
                        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                        format!("Operation {index} (update on {entity} id={id}) failed: {err}"),
                    )
                })?;
            result["id"] = json!(id);
            result["data"] = updated;
        }
        "delete" => {
            let id = non_empty_string(op, "id").ok_or_else(|| {
                envelope::bad_request(format!("Operation {index} (delete): missing required 'id' field"))
            })?;

            client.delete_entity(entity, id).await.map_err(|err| {
                envelope::failure(
                    StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    format!("Operation {index} (delete on {entity} id={id}) failed: {err}"),
                )
            })?;
            result["id"] = json!(id);
            result["deleted"] = json!(true);
        }
        other => {
            return Err(envelope::bad_request(format!(
                "Operation {index}: unsupported action '{other}' (valid: create, update, delete)"
            )));
        }
    }

    Ok(result)
}

fn require_string<'a>(op: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    op.get(field).and_then(Value::as_str)
}

fn non_empty_string<'a>(op: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    require_string(op, field).filter(|s| !s.is_empty())
}
