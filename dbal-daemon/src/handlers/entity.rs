//! Generic entity routes: dispatch plus CRUD.
//!
//! The dispatcher maps `(method, id present?)` onto the handler family; the
//! CRUD operations inject the route tenant on create and enforce read-after
//! -verify tenant isolation on read, update, and delete. Ownership
//! mismatches surface as NotFound so tenant existence is never leaked.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use bytes::Bytes;
use dbal_adapters::Client;
use dbal_core::{parse_route, Route};
use http::{Method, StatusCode};
use serde_json::{json, Value};

use super::{check_rate_limit, client_unavailable_response, inject_tenant, owned_by_tenant, parse_json_body};
use crate::envelope;
use crate::handlers::list::handle_list;
use crate::limit::ClientIp;
use crate::state::AppState;

/// GET/POST `/{tenant}/{package}/{entity}`.
pub async fn collection(
    State(state): State<AppState>,
    ip: ClientIp,
    method: Method,
    Path((tenant, package, entity)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let path = format!("/{tenant}/{package}/{entity}");
    serve(&state, ip, method, path, params, body).await
}

/// GET/POST/PUT/PATCH/DELETE `/{tenant}/{package}/{entity}/{id}`.
pub async fn item(
    State(state): State<AppState>,
    ip: ClientIp,
    method: Method,
    Path((tenant, package, entity, id)): Path<(String, String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let path = format!("/{tenant}/{package}/{entity}/{id}");
    serve(&state, ip, method, path, params, body).await
}

/// GET/POST `/{tenant}/{package}/{entity}/{id}/{action}` — reserved.
pub async fn action(
    State(state): State<AppState>,
    ip: ClientIp,
    method: Method,
    Path((tenant, package, entity, id, action)): Path<(String, String, String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let path = format!("/{tenant}/{package}/{entity}/{id}/{action}");
    serve(&state, ip, method, path, params, body).await
}

async fn serve(
    state: &AppState,
    ip: ClientIp,
    method: Method,
    path: String,
    params: HashMap<String, String>,
    body: Bytes,
) -> Response {
    let limiter = if method == Method::GET {
        &state.read_limiter
    } else {
        &state.mutation_limiter
    };
    if let Some(denied) = check_rate_limit(limiter, &ip) {
        return denied;
    }

    let client = match state.ensure_client().await {
        Ok(client) => client,
        Err(_) => return client_unavailable_response(),
    };

    let route = match parse_route(&path) {
        Ok(route) => route,
        Err(err) => return envelope::bad_request(err.to_string()),
    };

    tracing::trace!(%method, %path, "entity request");
    dispatch(&client, &route, &method, parse_json_body(&body), &params).await
}

/// Pick the handler family from the method and route shape.
async fn dispatch(
    client: &Client,
    route: &Route,
    method: &Method,
    body: Value,
    params: &HashMap<String, String>,
) -> Response {
    if !route.action.is_empty() {
        return envelope::failure(
            StatusCode::NOT_FOUND,
            "Custom actions are not supported yet",
        );
    }

    if *method == Method::GET {
        if route.id.is_empty() {
            handle_list(client, route, params).await
        } else {
            handle_read(client, route).await
        }
    } else if *method == Method::POST {
        if !route.id.is_empty() {
            return envelope::bad_request(
                "POST with a resource ID is not supported; use PUT/PATCH",
            );
        }
        handle_create(client, route, body).await
    } else if *method == Method::PUT || *method == Method::PATCH {
        handle_update(client, route, body).await
    } else if *method == Method::DELETE {
        handle_delete(client, route).await
    } else {
        envelope::failure(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Unsupported HTTP method: {method}"),
        )
    }
}

pub(crate) async fn handle_create(client: &Client, route: &Route, mut body: Value) -> Response {
    inject_tenant(&mut body, &route.tenant);
    match client.create_entity(&route.entity, body).await {
        Ok(created) => envelope::success(created),
        Err(err) => envelope::failure_from(&err),
    }
}

pub(crate) async fn handle_read(client: &Client, route: &Route) -> Response {
    match client.get_entity(&route.entity, &route.id).await {
        Ok(record) => {
            if !owned_by_tenant(&record, &route.tenant) {
                return envelope::failure(
                    StatusCode::NOT_FOUND,
                    format!("{} not found", route.entity),
                );
            }
            envelope::success(record)
        }
        Err(err) => envelope::failure_from(&err),
    }
}

pub(crate) async fn handle_update(client: &Client, route: &Route, body: Value) -> Response {
    if route.id.is_empty() {
        return envelope::bad_request("ID is required for update operations");
    }

    // Read first: the mutation must never touch another tenant's record,
    // even when the adapter has no native tenant filter.
    let existing = match client.get_entity(&route.entity, &route.id).await {
        Ok(record) => record,
        Err(err) => return envelope::failure_from(&err),
    };
    if !owned_by_tenant(&existing, &route.tenant) {
        return envelope::failure(
            StatusCode::NOT_FOUND,
            format!("{} not found", route.entity),
        );
    }

    if body.as_object().map(|obj| obj.is_empty()).unwrap_or(true) {
        return envelope::bad_request("At least one update field must be provided");
    }

    match client.update_entity(&route.entity, &route.id, body).await {
        Ok(updated) => envelope::success(updated),
        Err(err) => envelope::failure_from(&err),
    }
}

pub(crate) async fn handle_delete(client: &Client, route: &Route) -> Response {
    if route.id.is_empty() {
        return envelope::bad_request("ID is required for delete operations");
    }

    let existing = match client.get_entity(&route.entity, &route.id).await {
        Ok(record) => record,
        Err(err) => return envelope::failure_from(&err),
    };
    if !owned_by_tenant(&existing, &route.tenant) {
        return envelope::failure(
            StatusCode::NOT_FOUND,
            format!("{} not found", route.entity),
        );
    }

    match client.delete_entity(&route.entity, &route.id).await {
        Ok(deleted) => envelope::success(json!({ "deleted": deleted })),
        Err(err) => envelope::failure_from(&err),
    }
}
