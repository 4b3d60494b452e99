//! Adapter factory and registry.
//!
//! Maps the closed set of backend tags onto constructors. The SQL family is
//! wired in-tree through [`SqlAdapter`]; the remaining tags validate their
//! URLs but require their driver crates to be linked in, so constructing
//! them reports `CapabilityNotSupported`.

use dbal_core::validator;
use dbal_core::{Error, Result};

use crate::adapter::Adapter;
use crate::sql::SqlAdapter;

/// Every backend tag the registry knows, with a display description.
pub const SUPPORTED_ADAPTERS: [(&str, &str); 13] = [
    ("sqlite", "SQLite (embedded)"),
    ("postgres", "PostgreSQL"),
    ("mysql", "MySQL"),
    ("mongodb", "MongoDB"),
    ("redis", "Redis (cache layer)"),
    ("elasticsearch", "Elasticsearch (search)"),
    ("cassandra", "Apache Cassandra"),
    ("surrealdb", "SurrealDB"),
    ("supabase", "Supabase"),
    ("prisma", "Prisma (ORM bridge)"),
    ("dynamodb", "AWS DynamoDB"),
    ("cockroachdb", "CockroachDB"),
    ("tidb", "TiDB"),
];

/// Whether `adapter_type` belongs to the closed backend set.
pub fn is_supported(adapter_type: &str) -> bool {
    let tag = if adapter_type == "postgresql" { "postgres" } else { adapter_type };
    SUPPORTED_ADAPTERS.iter().any(|(name, _)| *name == tag)
}

/// Extract the canonical adapter tag from a connection URL.
pub fn extract_adapter_type(database_url: &str) -> Result<String> {
    let protocol = validator::extract_protocol(database_url)
        .ok_or_else(|| Error::Validation("Invalid URL format. Expected: protocol://...".to_string()))?;
    validator::adapter_type_for_protocol(&protocol)
        .map(str::to_string)
        .ok_or_else(|| Error::Validation(format!("Unsupported database protocol: {protocol}")))
}

/// Construct an adapter from a connection URL.
pub async fn create_from_url(database_url: &str) -> Result<Box<dyn Adapter>> {
    let adapter_type = extract_adapter_type(database_url)?;
    create_from_type(&adapter_type, database_url).await
}

/// Construct an adapter from an explicit tag and connection URL.
pub async fn create_from_type(
    adapter_type: &str,
    database_url: &str,
) -> Result<Box<dyn Adapter>> {
    validator::validate_url(database_url)?;

    match adapter_type {
        "sqlite" | "postgres" | "postgresql" | "mysql" | "cockroachdb" | "tidb" => {
            let tag = if adapter_type == "postgresql" { "postgres" } else { adapter_type };
            Ok(Box::new(SqlAdapter::connect(tag, database_url).await?))
        }
        other if is_supported(other) => Err(Error::CapabilityNotSupported(format!(
            "The {other} driver is not linked into this build"
        ))),
        other => Err(Error::Validation(format!("Unsupported adapter type: {other}"))),
    }
}
