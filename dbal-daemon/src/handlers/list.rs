//! Query-parameter parsing and list dispatch.

use std::collections::HashMap;

use axum::response::Response;
use dbal_adapters::Client;
use dbal_core::{ListOptions, Route};
use serde_json::json;

use crate::envelope;

/// Parse the list query surface into [`ListOptions`].
///
/// | Param | Effect |
/// |-------|--------|
/// | `limit` / `take` | positive page size |
/// | `page` | 1-indexed page |
/// | `skip` / `offset` | converted to a page when `page` is absent |
/// | `filter.<f>` / `where.<f>` | equality filter |
/// | `sort.<f>` / `orderBy.<f>` | `asc` or `desc` |
pub fn parse_list_query(params: &HashMap<String, String>) -> Result<ListOptions, String> {
    let mut options = ListOptions::default();
    let mut limit = None;
    let mut page = None;
    let mut offset = None;

    for (key, value) in params {
        match key.as_str() {
            "limit" | "take" => {
                limit = Some(parse_positive(value).ok_or("limit must be a positive integer")?);
            }
            "page" => {
                page = Some(parse_positive(value).ok_or("page must be a positive integer")?);
            }
            "skip" | "offset" => {
                offset =
                    Some(parse_non_negative(value).ok_or("offset must be a non-negative integer")?);
            }
            _ => {
                if let Some(field) = key.strip_prefix("filter.") {
                    options.filter.insert(field.to_string(), value.clone());
                } else if let Some(field) = key.strip_prefix("where.") {
                    options.filter.insert(field.to_string(), value.clone());
                } else if let Some(field) = key.strip_prefix("sort.") {
                    options.sort.insert(field.to_string(), value.clone());
                } else if let Some(field) = key.strip_prefix("orderBy.") {
                    options.sort.insert(field.to_string(), value.clone());
                }
            }
        }
    }

    if let (Some(offset), None) = (offset, page) {
        let effective_limit = limit.unwrap_or(ListOptions::default().limit);
        page = Some(offset / effective_limit + 1);
    }

    if let Some(limit) = limit {
        options.limit = limit;
    }
    if let Some(page) = page {
        options.page = page;
    }
    Ok(options)
}

fn parse_positive(value: &str) -> Option<u32> {
    value.parse::<i64>().ok().filter(|v| *v > 0).map(|v| v as u32)
}

fn parse_non_negative(value: &str) -> Option<u32> {
    value.parse::<i64>().ok().filter(|v| *v >= 0).map(|v| v as u32)
}

/// GET on a collection: tenant-scoped filter, then page through the adapter.
pub async fn handle_list(
    client: &Client,
    route: &Route,
    params: &HashMap<String, String>,
) -> Response {
    let mut options = match parse_list_query(params) {
        Ok(options) => options,
        Err(message) => return envelope::bad_request(message),
    };

    if !route.tenant.is_empty() {
        options
            .filter
            .insert("tenantId".to_string(), route.tenant.clone());
    }

    match client.list_entities(&route.entity, &options).await {
        Ok(result) => envelope::success(json!({
            "data": result.items,
            "total": result.total,
            "page": result.page,
            "limit": result.limit,
        })),
        Err(err) => envelope::failure_from(&err),
    }
}
