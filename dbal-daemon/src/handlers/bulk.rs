//! Single-entity transactional bulk operations.
//!
//! All-or-nothing: the first failing element rolls the transaction back and
//! reports the element index; nothing is visible afterwards.

use axum::extract::{Path, State};
use axum::response::Response;
use bytes::Bytes;
use dbal_adapters::Client;
use dbal_core::{parse_route, Route};
use http::StatusCode;
use serde_json::{json, Value};

use super::{check_rate_limit, client_unavailable_response, inject_tenant};
use crate::envelope;
use crate::limit::ClientIp;
use crate::state::AppState;

/// POST `/{tenant}/{package}/{entity}/_bulk/create`.
pub async fn create(
    State(state): State<AppState>,
    ip: ClientIp,
    Path((tenant, package, entity)): Path<(String, String, String)>,
    body: Bytes,
) -> Response {
    with_bulk_context(&state, ip, &tenant, &package, &entity, body, run_create).await
}

/// POST `/{tenant}/{package}/{entity}/_bulk/update`.
pub async fn update(
    State(state): State<AppState>,
    ip: ClientIp,
    Path((tenant, package, entity)): Path<(String, String, String)>,
    body: Bytes,
) -> Response {
    with_bulk_context(&state, ip, &tenant, &package, &entity, body, run_update).await
}

/// POST `/{tenant}/{package}/{entity}/_bulk/delete`.
pub async fn delete(
    State(state): State<AppState>,
    ip: ClientIp,
    Path((tenant, package, entity)): Path<(String, String, String)>,
    body: Bytes,
) -> Response {
    with_bulk_context(&state, ip, &tenant, &package, &entity, body, run_delete).await
}

type BulkRunner = for<'a> fn(
    &'a Client,
    &'a Route,
    Vec<Value>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send + 'a>>;

async fn with_bulk_context(
    state: &AppState,
    ip: ClientIp,
    tenant: &str,
    package: &str,
    entity: &str,
    body: Bytes,
    run: BulkRunner,
) -> Response {
    if let Some(denied) = check_rate_limit(&state.mutation_limiter, &ip) {
        return denied;
    }
    let client = match state.ensure_client().await {
        Ok(client) => client,
        Err(_) => return client_unavailable_response(),
    };

    let route = match parse_route(&format!("/{tenant}/{package}/{entity}")) {
        Ok(route) => route,
        Err(err) => return envelope::bad_request(err.to_string()),
    };

    let items = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Array(items)) => items,
        Ok(_) | Err(_) => {
            return envelope::bad_request("Bulk operations require an array body");
        }
    };
    if items.is_empty() {
        return envelope::bad_request("Bulk operations require a non-empty array");
    }

    if let Err(err) = client.begin_transaction().await {
        tracing::error!(error = %err, "bulk begin_transaction failed");
        return envelope::failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to begin transaction");
    }

    run(&client, &route, items).await
}

/// Roll back (best effort) and report the failing element.
async fn fail_element(client: &Client, message: String) -> Response {
    if let Err(err) = client.rollback_transaction().await {
        tracing::warn!(error = %err, "bulk rollback failed");
    }
    envelope::bad_request(message)
}

async fn commit_or_500(client: &Client) -> Option<Response> {
    match client.commit_transaction().await {
        Ok(_) => None,
        Err(err) => {
            tracing::error!(error = %err, "bulk commit failed");
            Some(envelope::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to commit transaction",
            ))
        }
    }
}

fn run_create<'a>(
    client: &'a Client,
    route: &'a Route,
    items: Vec<Value>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send + 'a>> {
    Box::pin(async move {
        let mut results = Vec::with_capacity(items.len());
        for (index, mut item) in items.into_iter().enumerate() {
            inject_tenant(&mut item, &route.tenant);
            match client.create_entity(&route.entity, item).await {
                Ok(created) => results.push(created),
                Err(err) => {
                    return fail_element(
                        client,
                        format!("Bulk create failed at item {index}: {err}"),
                    )
                    .await
                }
            }
        }
        if let Some(response) = commit_or_500(client).await {
            return response;
        }
        envelope::success(json!({
            "success": true,
            "inserted": results.len(),
            "data": results,
        }))
    })
}

fn run_update<'a>(
    client: &'a Client,
    route: &'a Route,
    items: Vec<Value>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send + 'a>> {
    Box::pin(async move {
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let (id, data) = match (item.get("id"), item.get("data")) {
                (Some(Value::String(id)), Some(data @ Value::Object(_))) => {
                    (id.clone(), data.clone())
                }
                _ => {
                    return fail_element(
                        client,
                        format!("Bulk update item {index} must be an object with 'id' and 'data' fields"),
                    )
                    .await
                }
            };
            if id.is_empty() {
                return fail_element(client, format!("Bulk update item {index} has empty 'id'"))
                    .await;
            }

            match client.update_entity(&route.entity, &id, data).await {
                Ok(updated) => results.push(updated),
                Err(err) => {
                    return fail_element(
                        client,
                        format!("Bulk update failed at item {index} (id={id}): {err}"),
                    )
                    .await
                }
            }
        }
        if let Some(response) = commit_or_500(client).await {
            return response;
        }
        envelope::success(json!({
            "success": true,
            "updated": results.len(),
            "data": results,
        }))
    })
}

fn run_delete<'a>(
    client: &'a Client,
    route: &'a Route,
    items: Vec<Value>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send + 'a>> {
    Box::pin(async move {
        let mut deleted_ids = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let Value::String(id) = item else {
                return fail_element(
                    client,
                    format!("Bulk delete item {index} must be a string ID"),
                )
                .await;
            };
            if id.is_empty() {
                return fail_element(client, format!("Bulk delete item {index} has empty ID"))
                    .await;
            }

            if let Err(err) = client.delete_entity(&route.entity, &id).await {
                return fail_element(
                    client,
                    format!("Bulk delete failed at item {index} (id={id}): {err}"),
                )
                .await;
            }
            deleted_ids.push(id);
        }
        if let Some(response) = commit_or_500(client).await {
            return response;
        }
        envelope::success(json!({
            "success": true,
            "deleted": deleted_ids.len(),
            "ids": deleted_ids,
        }))
    })
}
