//! Schema registry and migration staging.
//!
//! The registry is a JSON file holding approved entity schemas plus the
//! migrations staged by `scan`. Scanning walks the packages directory for
//! `entities.yaml` definitions and stages anything the registry has not
//! seen; `approve`/`reject` settle staged migrations, and `generate` writes
//! the approved set to the configured output path.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use dbal_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMigration {
    pub id: String,
    pub package: String,
    pub entity: String,
    pub action: String,
    pub fields: Value,
    pub detected_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    schemas: BTreeMap<String, Value>,
    #[serde(default)]
    pending: Vec<PendingMigration>,
}

pub struct SchemaRegistry {
    registry_path: PathBuf,
    packages_path: PathBuf,
    output_path: PathBuf,
}

impl SchemaRegistry {
    pub fn new(registry_path: PathBuf, packages_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            registry_path,
            packages_path,
            output_path,
        }
    }

    fn load(&self) -> Result<RegistryFile> {
        if !self.registry_path.exists() {
            return Ok(RegistryFile::default());
        }
        let raw = std::fs::read_to_string(&self.registry_path)
            .map_err(|e| Error::Internal(format!("read schema registry: {e}")))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Internal(format!("parse schema registry: {e}")))
    }

    fn save(&self, registry: &RegistryFile) -> Result<()> {
        if let Some(parent) = self.registry_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("create registry dir: {e}")))?;
        }
        let raw = serde_json::to_string_pretty(registry)
            .map_err(|e| Error::Internal(format!("encode schema registry: {e}")))?;
        std::fs::write(&self.registry_path, raw)
            .map_err(|e| Error::Internal(format!("write schema registry: {e}")))
    }

    /// Registry state: known schemas and pending migrations.
    pub fn list(&self) -> Result<Value> {
        let registry = self.load()?;
        Ok(json!({
            "schemas": registry.schemas,
            "schema_count": registry.schemas.len(),
            "pending": registry.pending,
            "pending_count": registry.pending.len(),
        }))
    }

    /// Walk the packages directory and stage unseen entity definitions.
    pub fn scan(&self) -> Result<Value> {
        let mut registry = self.load()?;
        let mut scanned_packages = 0u64;
        let mut staged = Vec::new();

        let entries = std::fs::read_dir(&self.packages_path)
            .map_err(|e| Error::Validation(format!("packages directory unreadable: {e}")))?;

        for entry in entries.flatten() {
            let package_dir = entry.path();
            if !package_dir.is_dir() {
                continue;
            }
            let definitions = package_dir.join("entities.yaml");
            if !definitions.exists() {
                continue;
            }
            scanned_packages += 1;
            let package = entry.file_name().to_string_lossy().into_owned();

            let raw = std::fs::read_to_string(&definitions)
                .map_err(|e| Error::Internal(format!("read {}: {e}", definitions.display())))?;
            let parsed: serde_yaml::Value = serde_yaml::from_str(&raw)
                .map_err(|e| Error::Validation(format!("{package}/entities.yaml: {e}")))?;
            let parsed: Value = serde_json::to_value(parsed)
                .map_err(|e| Error::Validation(format!("{package}/entities.yaml: {e}")))?;

            let Some(entities) = parsed.as_object() else {
                return Err(Error::Validation(format!(
                    "{package}/entities.yaml must be a mapping of entity names"
                )));
            };

            for (entity, fields) in entities {
                let seen = registry.schemas.contains_key(entity)
                    || registry.pending.iter().any(|p| p.entity == *entity);
                if seen {
                    continue;
                }
                let migration = PendingMigration {
                    id: format!("mig_{}", Uuid::new_v4().simple()),
                    package: package.clone(),
                    entity: entity.clone(),
                    action: "add_entity".to_string(),
                    fields: fields.clone(),
                    detected_at: Utc::now().to_rfc3339(),
                };
                staged.push(migration.id.clone());
                registry.pending.push(migration);
            }
        }

        self.save(&registry)?;
        tracing::info!(packages = scanned_packages, staged = staged.len(), "schema scan complete");
        Ok(json!({
            "scanned_packages": scanned_packages,
            "staged": staged,
            "pending_count": registry.pending.len(),
        }))
    }

    /// Promote one pending migration (or `all`) into the schema set.
    pub fn approve(&self, id: &str) -> Result<Value> {
        let mut registry = self.load()?;
        let selected = take_pending(&mut registry.pending, id)?;

        let mut approved = Vec::with_capacity(selected.len());
        for migration in selected {
            registry
                .schemas
                .insert(migration.entity.clone(), migration.fields.clone());
            approved.push(migration.id);
        }
        self.save(&registry)?;
        Ok(json!({ "approved": approved, "pending_count": registry.pending.len() }))
    }

    /// Drop one pending migration (or `all`).
    pub fn reject(&self, id: &str) -> Result<Value> {
        let mut registry = self.load()?;
        let selected = take_pending(&mut registry.pending, id)?;
        let rejected: Vec<String> = selected.into_iter().map(|m| m.id).collect();
        self.save(&registry)?;
        Ok(json!({ "rejected": rejected, "pending_count": registry.pending.len() }))
    }

    /// Write the approved schema set to the output path.
    pub fn generate(&self) -> Result<Value> {
        let registry = self.load()?;

        let mut out = String::from("// Generated by the DBAL schema registry. Do not edit.\n");
        for (entity, fields) in &registry.schemas {
            out.push_str(&format!("\nmodel {} {{\n", pascal_case(entity)));
            out.push_str("  id String @id\n");
            if let Some(fields) = fields.as_object() {
                for (name, kind) in fields {
                    if name == "id" {
                        continue;
                    }
                    out.push_str(&format!(
                        "  {name} {}\n",
                        field_type(kind.as_str().unwrap_or("string"))
                    ));
                }
            }
            out.push_str("}\n");
        }

        if let Some(parent) = self.output_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("create output dir: {e}")))?;
        }
        std::fs::write(&self.output_path, &out)
            .map_err(|e| Error::Internal(format!("write generated schema: {e}")))?;

        Ok(json!({
            "generated": true,
            "path": self.output_path.display().to_string(),
            "models": registry.schemas.len(),
        }))
    }
}

fn take_pending(pending: &mut Vec<PendingMigration>, id: &str) -> Result<Vec<PendingMigration>> {
    if id == "all" {
        if pending.is_empty() {
            return Err(Error::NotFound("No pending migrations".to_string()));
        }
        return Ok(std::mem::take(pending));
    }
    match pending.iter().position(|m| m.id == id) {
        Some(index) => Ok(vec![pending.remove(index)]),
        None => Err(Error::NotFound(format!("Migration '{id}' not found"))),
    }
}

fn pascal_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = true;
    for c in input.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn field_type(kind: &str) -> &'static str {
    match kind.to_ascii_lowercase().as_str() {
        "int" | "integer" => "Int",
        "bool" | "boolean" => "Boolean",
        "float" | "number" | "double" => "Float",
        "datetime" | "timestamp" => "DateTime",
        _ => "String",
    }
}
