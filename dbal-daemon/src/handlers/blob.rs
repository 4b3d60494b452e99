//! Blob storage routes.
//!
//! Every user key is namespaced as `{tenant}/{package}/{key}` before it
//! reaches the backend, and listings strip that prefix again, so each
//! `{tenant, package}` pair sees a private bucket.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dbal_blob::{BlobListOptions, BlobMetadata, UploadOptions};
use dbal_core::Error;
use http::{HeaderMap, Method, StatusCode};
use serde_json::{json, Map, Value};

use super::check_rate_limit;
use crate::envelope;
use crate::limit::ClientIp;
use crate::state::AppState;

fn storage_key(tenant: &str, package: &str, key: &str) -> String {
    format!("{tenant}/{package}/{key}")
}

fn strip_key_prefix(tenant: &str, package: &str, storage_key: &str) -> String {
    let prefix = format!("{tenant}/{package}/");
    storage_key
        .strip_prefix(&prefix)
        .unwrap_or(storage_key)
        .to_string()
}

fn iso8601(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn metadata_to_json(meta: &BlobMetadata, tenant: &str, package: &str) -> Value {
    let mut body = json!({
        "key": strip_key_prefix(tenant, package, &meta.key),
        "size": meta.size,
        "contentType": meta.content_type,
        "etag": meta.etag,
        "lastModified": iso8601(meta.last_modified),
    });
    if !meta.custom_metadata.is_empty() {
        body["customMetadata"] = json!(meta.custom_metadata);
    }
    body
}

/// GET `/{tenant}/{package}/blob` — prefix listing.
pub async fn list(
    State(state): State<AppState>,
    ip: ClientIp,
    Path((tenant, package)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(denied) = check_rate_limit(&state.read_limiter, &ip) {
        return denied;
    }

    let tenant_prefix = format!("{tenant}/{package}/");
    let options = BlobListOptions {
        prefix: match params.get("prefix") {
            Some(prefix) => format!("{tenant_prefix}{prefix}"),
            None => tenant_prefix,
        },
        continuation_token: params.get("continuationToken").cloned(),
        max_keys: params.get("maxKeys").and_then(|v| v.parse().ok()),
    };

    match state.blob.list(&options).await {
        Ok(result) => {
            let items: Vec<Value> = result
                .items
                .iter()
                .map(|meta| metadata_to_json(meta, &tenant, &package))
                .collect();
            Json(json!({
                "items": items,
                "isTruncated": result.is_truncated,
                "nextToken": result.next_token,
            }))
            .into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "blob list error");
            envelope::blob_failure(&err)
        }
    }
}

/// GET `/{tenant}/{package}/blob/_stats`.
pub async fn stats(
    State(state): State<AppState>,
    ip: ClientIp,
    Path((_tenant, _package)): Path<(String, String)>,
) -> Response {
    if let Some(denied) = check_rate_limit(&state.read_limiter, &ip) {
        return denied;
    }

    let total_size = match state.blob.total_size().await {
        Ok(size) => size,
        Err(err) => return envelope::blob_failure(&err),
    };
    let object_count = match state.blob.object_count().await {
        Ok(count) => count,
        Err(err) => return envelope::blob_failure(&err),
    };

    Json(json!({
        "totalSize": total_size,
        "totalSizeBytes": total_size,
        "objectCount": object_count,
        "count": object_count,
    }))
    .into_response()
}

/// PUT/GET/DELETE/HEAD `/{tenant}/{package}/blob/{key}`.
pub async fn item(
    State(state): State<AppState>,
    ip: ClientIp,
    method: Method,
    Path((tenant, package, key)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let limiter = if method == Method::GET || method == Method::HEAD {
        &state.read_limiter
    } else {
        &state.mutation_limiter
    };
    if let Some(denied) = check_rate_limit(limiter, &ip) {
        return denied;
    }

    if method == Method::PUT {
        upload(&state, &tenant, &package, &key, &headers, body).await
    } else if method == Method::GET {
        download(&state, &tenant, &package, &key).await
    } else if method == Method::DELETE {
        delete(&state, &tenant, &package, &key).await
    } else if method == Method::HEAD {
        head(&state, &tenant, &package, &key).await
    } else {
        envelope::blob_failure_with(
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            "Method not allowed",
        )
    }
}

/// GET/POST `/{tenant}/{package}/blob/{key}/{action}` — presign, copy.
pub async fn action(
    State(state): State<AppState>,
    ip: ClientIp,
    method: Method,
    Path((tenant, package, key, action)): Path<(String, String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
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

    match action.as_str() {
        "presign" => presign(&state, &tenant, &package, &key, &params).await,
        "copy" => copy(&state, &tenant, &package, &key, &body).await,
        other => envelope::blob_failure_with(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("Unknown blob action: {other}"),
        ),
    }
}

async fn upload(
    state: &AppState,
    tenant: &str,
    package: &str,
    key: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let mut options = UploadOptions::default();
    if let Some(content_type) = header("content-type").filter(|v| !v.is_empty()) {
        options.content_type = content_type.to_string();
    }
    if let Some(overwrite) = header("x-blob-overwrite") {
        options.overwrite = overwrite == "true" || overwrite == "1";
    }
    if let Some(metadata) = header("x-blob-metadata") {
        match serde_json::from_str::<Map<String, Value>>(metadata) {
            Ok(parsed) => {
                for (name, value) in parsed {
                    let value = match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    options.metadata.insert(name, value);
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to parse X-Blob-Metadata header"),
        }
    }

    match state
        .blob
        .upload(&storage_key(tenant, package, key), body, &options)
        .await
    {
        Ok(meta) => (
            StatusCode::CREATED,
            Json(metadata_to_json(&meta, tenant, package)),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, key, "blob upload error");
            envelope::blob_failure(&err)
        }
    }
}

async fn download(state: &AppState, tenant: &str, package: &str, key: &str) -> Response {
    let storage_key = storage_key(tenant, package, key);

    let content_type = match state.blob.metadata(&storage_key).await {
        Ok(meta) => meta.content_type,
        Err(_) => "application/octet-stream".to_string(),
    };

    match state.blob.download(&storage_key).await {
        Ok(data) => (
            StatusCode::OK,
            [(http::header::CONTENT_TYPE, content_type)],
            data,
        )
            .into_response(),
        Err(err) => envelope::blob_failure(&err),
    }
}

async fn delete(state: &AppState, tenant: &str, package: &str, key: &str) -> Response {
    match state.blob.delete(&storage_key(tenant, package, key)).await {
        Ok(()) => Json(json!({ "success": true, "deleted": true })).into_response(),
        Err(err) => envelope::blob_failure(&err),
    }
}

async fn head(state: &AppState, tenant: &str, package: &str, key: &str) -> Response {
    let meta = match state.blob.metadata(&storage_key(tenant, package, key)).await {
        Ok(meta) => meta,
        Err(err) => {
            // HEAD carries no body, just the status.
            return StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_LENGTH, meta.size)
        .header(http::header::CONTENT_TYPE, &meta.content_type)
        .header(http::header::ETAG, &meta.etag)
        .header(
            http::header::LAST_MODIFIED,
            meta.last_modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
    if !meta.custom_metadata.is_empty() {
        response = response.header(
            "X-Blob-Metadata",
            serde_json::to_string(&meta.custom_metadata).unwrap_or_default(),
        );
    }
    response
        .body(axum::body::Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn presign(
    state: &AppState,
    tenant: &str,
    package: &str,
    key: &str,
    params: &HashMap<String, String>,
) -> Response {
    let expires = params
        .get("expires")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(3600);

    match state
        .blob
        .presigned_url(&storage_key(tenant, package, key), Duration::from_secs(expires))
        .await
    {
        Ok(url) => Json(json!({ "url": url, "presignedUrl": url })).into_response(),
        Err(err) => {
            tracing::error!(error = %err, key, "blob presign error");
            envelope::blob_failure(&err)
        }
    }
}

async fn copy(state: &AppState, tenant: &str, package: &str, key: &str, body: &Bytes) -> Response {
    let parsed: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => {
            return envelope::blob_failure(&Error::Validation("Invalid JSON body".to_string()))
        }
    };
    let dest_key = match parsed.get("destKey") {
        Some(Value::String(dest)) if !dest.is_empty() => dest.clone(),
        Some(Value::String(_)) => {
            return envelope::blob_failure(&Error::Validation(
                "destKey must not be empty".to_string(),
            ))
        }
        _ => {
            return envelope::blob_failure(&Error::Validation(
                "Missing required field: destKey".to_string(),
            ))
        }
    };

    match state
        .blob
        .copy(
            &storage_key(tenant, package, key),
            &storage_key(tenant, package, &dest_key),
        )
        .await
    {
        Ok(meta) => Json(metadata_to_json(&meta, tenant, package)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, key, dest_key, "blob copy error");
            envelope::blob_failure(&err)
        }
    }
}
