//! Document-level query logic shared by the built-in adapters.
//!
//! Filtering, sorting, and pagination operate on top-level fields of JSON
//! documents, so the same code serves the in-memory store and the SQL
//! backends (which keep documents as opaque JSON).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use dbal_core::{Error, ListOptions, ListResult, Result};
use serde_json::Value;
use uuid::Uuid;

/// Validate a new document and settle its id.
///
/// The body must be a JSON object with at least one field beyond the
/// injected `tenantId` and `id`. A caller-supplied id must be a non-empty
/// string; otherwise a v4 UUID is assigned.
pub fn prepare_new_document(data: Value) -> Result<(String, Value)> {
    let Value::Object(mut obj) = data else {
        return Err(Error::Validation("Document body must be a JSON object".to_string()));
    };

    if !obj.keys().any(|k| k != "tenantId" && k != "id") {
        return Err(Error::Validation(
            "Document must contain at least one field".to_string(),
        ));
    }

    let id = match obj.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(_) => {
            return Err(Error::Validation(
                "Document 'id' must be a non-empty string".to_string(),
            ))
        }
        None => Uuid::new_v4().to_string(),
    };
    obj.insert("id".to_string(), Value::String(id.clone()));

    Ok((id, Value::Object(obj)))
}

/// Overlay `updates` onto an existing document, keeping the stored id.
pub fn merge_document(existing: Value, updates: Value) -> Result<Value> {
    let Value::Object(updates) = updates else {
        return Err(Error::Validation("Update body must be a JSON object".to_string()));
    };
    let Value::Object(mut merged) = existing else {
        return Err(Error::Internal("Stored document is not an object".to_string()));
    };

    let id = merged.get("id").cloned();
    for (key, value) in updates {
        merged.insert(key, value);
    }
    if let Some(id) = id {
        merged.insert("id".to_string(), id);
    }

    Ok(Value::Object(merged))
}

fn field_matches(doc: &Value, field: &str, expected: &str) -> bool {
    match doc.get(field) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == expected,
    }
}

/// True when every filter entry matches the document's top-level fields.
pub fn matches_filters(doc: &Value, filter: &BTreeMap<String, String>) -> bool {
    filter.iter().all(|(field, expected)| field_matches(doc, field, expected))
}

fn compare_fields(a: &Value, b: &Value, field: &str) -> Ordering {
    let (a, b) = (a.get(field), b.get(field));
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => value_to_sort_key(x).cmp(&value_to_sort_key(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn value_to_sort_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Filter, sort, and paginate a full document set.
pub fn apply_list_options(docs: Vec<Value>, options: &ListOptions) -> ListResult<Value> {
    let mut filtered: Vec<Value> = docs
        .into_iter()
        .filter(|doc| matches_filters(doc, &options.filter))
        .collect();

    for (field, direction) in options.sort.iter().rev() {
        filtered.sort_by(|a, b| {
            let ord = compare_fields(a, b, field);
            if direction.eq_ignore_ascii_case("desc") {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    let total = filtered.len() as u64;
    let limit = options.limit.max(1);
    let page = options.page.max(1);
    let start = ((page - 1) as usize).saturating_mul(limit as usize);
    let items: Vec<Value> = filtered
        .into_iter()
        .skip(start)
        .take(limit as usize)
        .collect();
    let has_more = (page as u64) * (limit as u64) < total;

    ListResult {
        items,
        total,
        page,
        limit,
        has_more,
    }
}

/// Reject entity names that could not have come from a parsed route.
pub fn validate_entity_name(entity: &str) -> Result<()> {
    let ok = !entity.is_empty()
        && entity.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(format!("Invalid entity name: {entity}")))
    }
}
