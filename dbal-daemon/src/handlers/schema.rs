//! Schema management endpoint.
//!
//! The handler validates the envelope and dispatches; the registry logic
//! lives in [`crate::schema_registry`]. Reads warm the metadata cache with
//! the known entity names and schemas, and every mutating action expires it
//! so the next read sees the registry's new state.

use axum::extract::State;
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;

use super::parse_json_body;
use crate::envelope;
use crate::schema_registry::SchemaRegistry;
use crate::state::AppState;

fn registry(state: &AppState) -> SchemaRegistry {
    SchemaRegistry::new(
        state.settings.schema_registry_path.clone(),
        state.settings.packages_path.clone(),
        state.settings.schema_output_path.clone(),
    )
}

fn warm_cache(state: &AppState, listing: &Value) {
    let Some(schemas) = listing.get("schemas").and_then(Value::as_object) else {
        return;
    };
    state
        .metadata_cache
        .cache_available_entities(schemas.keys().cloned().collect());
    for (entity, fields) in schemas {
        state.metadata_cache.cache_entity_schema(entity, fields.clone());
    }
}

/// GET `/api/dbal/schema` — known schemas and pending migrations.
pub async fn get(State(state): State<AppState>) -> Response {
    match registry(&state).list() {
        Ok(data) => {
            warm_cache(&state, &data);
            envelope::success(data)
        }
        Err(err) => envelope::failure_from(&err),
    }
}

/// POST `/api/dbal/schema` — `{action, id?}` dispatch.
pub async fn post(State(state): State<AppState>, body: Bytes) -> Response {
    let parsed = parse_json_body(&body);
    let action = parsed.get("action").and_then(Value::as_str).unwrap_or_default();
    let id = parsed.get("id").and_then(Value::as_str).unwrap_or_default();

    let registry = registry(&state);
    let result = match action {
        "scan" => registry.scan(),
        "approve" => {
            if id.is_empty() {
                return envelope::bad_request("Migration ID required");
            }
            registry.approve(id)
        }
        "reject" => {
            if id.is_empty() {
                return envelope::bad_request("Migration ID required");
            }
            registry.reject(id)
        }
        "generate" => registry.generate(),
        other => return envelope::bad_request(format!("Unknown action: {other}")),
    };

    match result {
        Ok(data) => {
            state.metadata_cache.invalidate_all();
            envelope::success(data)
        }
        Err(err) => envelope::failure_from(&err),
    }
}
