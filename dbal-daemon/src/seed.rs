//! YAML seed loading.
//!
//! Seed files live in one directory, one `{entity}.yaml` per entity, each a
//! sequence of records (or a mapping of entity name to sequence, for files
//! that seed several entities). Known files load in dependency order so
//! parents exist before their dependents; anything else follows
//! alphabetically. Existing records are skipped unless `force` is set.

use std::path::{Path, PathBuf};

use dbal_adapters::Client;
use dbal_core::Error;
use serde_json::Value;

/// Parent entities first, dependents later.
const SEED_LOAD_ORDER: [&str; 13] = [
    "users.yaml",
    "credentials.yaml",
    "workspaces.yaml",
    "installed_packages.yaml",
    "projects.yaml",
    "workflows.yaml",
    "products.yaml",
    "games.yaml",
    "artists.yaml",
    "videos.yaml",
    "forum.yaml",
    "notifications.yaml",
    "audit_logs.yaml",
];

#[derive(Debug, Default)]
pub struct EntitySeedResult {
    pub entity: String,
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SeedSummary {
    pub success: bool,
    pub total_inserted: u64,
    pub total_skipped: u64,
    pub total_failed: u64,
    pub results: Vec<EntitySeedResult>,
    pub errors: Vec<String>,
}

/// First existing candidate directory, mirroring the common deployments.
pub fn default_seed_dir() -> PathBuf {
    let candidates = [
        "dbal/shared/seeds/database",
        "../shared/seeds/database",
        "/app/dbal/shared/seeds/database",
        "/app/seeds/database",
    ];
    for candidate in candidates {
        let path = Path::new(candidate);
        if path.is_dir() {
            return path.to_path_buf();
        }
    }
    PathBuf::from(candidates[0])
}

fn ordered_seed_files(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let entries = std::fs::read_dir(dir).map_err(|e| format!("seed directory unreadable: {e}"))?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml"))
        .collect();
    files.sort();

    let position = |path: &Path| {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        name.and_then(|n| SEED_LOAD_ORDER.iter().position(|f| *f == n))
            .unwrap_or(SEED_LOAD_ORDER.len())
    };
    files.sort_by_key(|path| position(path));
    Ok(files)
}

fn parse_seed_file(path: &Path) -> Result<Vec<(String, Vec<Value>)>, String> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{stem}: {e}"))?;
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|e| format!("{stem}: {e}"))?;
    let parsed: Value = serde_json::to_value(parsed).map_err(|e| format!("{stem}: {e}"))?;

    match parsed {
        Value::Array(records) => Ok(vec![(stem, records)]),
        Value::Object(map) => {
            let mut out = Vec::new();
            for (entity, records) in map {
                match records {
                    Value::Array(records) => out.push((entity, records)),
                    _ => return Err(format!("{stem}: entity '{entity}' is not a sequence")),
                }
            }
            Ok(out)
        }
        Value::Null => Ok(Vec::new()),
        _ => Err(format!("{stem}: seed file must be a sequence or mapping")),
    }
}

/// Load every seed file in `dir` through the client.
pub async fn load_seeds(client: &Client, dir: &Path, force: bool) -> SeedSummary {
    let mut summary = SeedSummary::default();

    let files = match ordered_seed_files(dir) {
        Ok(files) => files,
        Err(message) => {
            summary.errors.push(message);
            return summary;
        }
    };

    for file in files {
        let batches = match parse_seed_file(&file) {
            Ok(batches) => batches,
            Err(message) => {
                summary.errors.push(message);
                continue;
            }
        };

        for (entity, records) in batches {
            let mut result = EntitySeedResult {
                entity: entity.clone(),
                ..Default::default()
            };

            for record in records {
                match seed_record(client, &entity, record, force).await {
                    SeedOutcome::Inserted => result.inserted += 1,
                    SeedOutcome::Skipped => result.skipped += 1,
                    SeedOutcome::Failed(message) => {
                        result.failed += 1;
                        result.errors.push(message);
                    }
                }
            }

            summary.total_inserted += result.inserted;
            summary.total_skipped += result.skipped;
            summary.total_failed += result.failed;
            summary.results.push(result);
        }
    }

    summary.success = summary.total_failed == 0 && summary.errors.is_empty();
    tracing::info!(
        inserted = summary.total_inserted,
        skipped = summary.total_skipped,
        failed = summary.total_failed,
        "seed load complete"
    );
    summary
}

enum SeedOutcome {
    Inserted,
    Skipped,
    Failed(String),
}

async fn seed_record(client: &Client, entity: &str, record: Value, force: bool) -> SeedOutcome {
    let id = record
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let (Some(id), false) = (&id, force) {
        if client.get_entity(entity, id).await.is_ok() {
            return SeedOutcome::Skipped;
        }
    }

    match client.create_entity(entity, record.clone()).await {
        Ok(_) => SeedOutcome::Inserted,
        Err(Error::Conflict(_)) if force => {
            let id = id.unwrap_or_default();
            match client.update_entity(entity, &id, record).await {
                Ok(_) => SeedOutcome::Inserted,
                Err(err) => SeedOutcome::Failed(format!("{entity} id={id}: {err}")),
            }
        }
        Err(err) => SeedOutcome::Failed(format!("{entity}: {err}")),
    }
}
