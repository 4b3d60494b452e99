//! # dbal-blob — S3-style blob storage facade
//!
//! One [`BlobStorage`] trait, three backends:
//!
//! | Backend | Selection | Notes |
//! |---------|-----------|-------|
//! | [`MemoryStorage`] | `DBAL_BLOB_BACKEND=memory` (default) | In-process map |
//! | [`FilesystemStorage`] | `DBAL_BLOB_BACKEND=filesystem` | Files under `DBAL_BLOB_ROOT` |
//! | [`S3Storage`] | `DBAL_BLOB_BACKEND=s3` | Remote object store, SigV4 |
//!
//! Keys arrive already namespaced (`{tenant}/{package}/{userKey}`); the
//! backends treat them as opaque. Operations a backend cannot provide
//! (presigned URLs outside S3) report `CapabilityNotSupported`.

pub mod fs;
pub mod memory;
pub mod s3;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dbal_core::Result;

pub use fs::FilesystemStorage;
pub use memory::MemoryStorage;
pub use s3::{S3Config, S3Storage};

/// Descriptive state of one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Full storage key, including the tenant/package prefix.
    pub key: String,
    pub size: u64,
    pub content_type: String,
    /// Opaque version identifier, stable across non-mutating reads.
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub custom_metadata: BTreeMap<String, String>,
}

/// Options applied on upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub content_type: String,
    pub overwrite: bool,
    pub metadata: BTreeMap<String, String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            content_type: "application/octet-stream".to_string(),
            overwrite: true,
            metadata: BTreeMap::new(),
        }
    }
}

/// Options for prefix listings.
#[derive(Debug, Clone, Default)]
pub struct BlobListOptions {
    pub prefix: String,
    pub continuation_token: Option<String>,
    pub max_keys: Option<usize>,
}

pub const DEFAULT_MAX_KEYS: usize = 1000;

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct BlobList {
    pub items: Vec<BlobMetadata>,
    pub is_truncated: bool,
    pub next_token: Option<String>,
}

/// The capability set every blob backend implements.
#[async_trait::async_trait]
pub trait BlobStorage: Send + Sync {
    /// Backend tag: `memory`, `filesystem`, or `s3`.
    fn backend(&self) -> &str;

    async fn upload(&self, key: &str, data: Bytes, options: &UploadOptions) -> Result<BlobMetadata>;
    async fn download(&self, key: &str) -> Result<Bytes>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn metadata(&self, key: &str) -> Result<BlobMetadata>;
    async fn list(&self, options: &BlobListOptions) -> Result<BlobList>;
    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<BlobMetadata>;
    async fn presigned_url(&self, key: &str, expires: Duration) -> Result<String>;
    async fn total_size(&self) -> Result<u64>;
    async fn object_count(&self) -> Result<u64>;
}

/// Blob backend configuration, normally read from the environment once at
/// startup.
#[derive(Debug, Clone)]
pub enum BlobConfig {
    Memory,
    Filesystem { root: std::path::PathBuf },
    S3(S3Config),
}

impl BlobConfig {
    /// Read `DBAL_BLOB_*` variables; unset or unknown backends fall back to
    /// memory.
    pub fn from_env() -> Self {
        let backend = std::env::var("DBAL_BLOB_BACKEND").unwrap_or_default();
        match backend.as_str() {
            "filesystem" => {
                let root = std::env::var("DBAL_BLOB_ROOT")
                    .unwrap_or_else(|_| "/tmp/dbal-blobs".to_string());
                BlobConfig::Filesystem { root: root.into() }
            }
            "s3" => {
                let env_or = |name: &str, fallback: &str| {
                    std::env::var(name).unwrap_or_else(|_| fallback.to_string())
                };
                BlobConfig::S3(S3Config {
                    endpoint: env_or("DBAL_BLOB_URL", "http://localhost:9000"),
                    bucket: env_or("DBAL_BLOB_BUCKET", "dbal-storage"),
                    region: env_or("DBAL_BLOB_REGION", "us-east-1"),
                    access_key: env_or("DBAL_BLOB_ACCESS_KEY", ""),
                    secret_key: env_or("DBAL_BLOB_SECRET_KEY", ""),
                    use_path_style: std::env::var("DBAL_BLOB_PATH_STYLE").as_deref() != Ok("false"),
                })
            }
            _ => BlobConfig::Memory,
        }
    }

    /// Build the configured backend.
    pub fn build(self) -> Arc<dyn BlobStorage> {
        match self {
            BlobConfig::Memory => {
                tracing::info!("Blob storage: memory");
                Arc::new(MemoryStorage::new())
            }
            BlobConfig::Filesystem { root } => {
                tracing::info!(root = %root.display(), "Blob storage: filesystem");
                Arc::new(FilesystemStorage::new(root))
            }
            BlobConfig::S3(config) => {
                tracing::info!(endpoint = %config.endpoint, bucket = %config.bucket, "Blob storage: s3");
                Arc::new(S3Storage::new(config))
            }
        }
    }
}

pub(crate) fn content_etag(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Shared page-slicing for backends that list from an ordered key set.
pub(crate) fn paginate_keys(
    keys: impl Iterator<Item = String>,
    options: &BlobListOptions,
) -> (Vec<String>, bool, Option<String>) {
    let max_keys = options.max_keys.unwrap_or(DEFAULT_MAX_KEYS).max(1);
    let start_after = options.continuation_token.clone().unwrap_or_default();

    let mut matched: Vec<String> = keys
        .filter(|k| k.starts_with(&options.prefix))
        .filter(|k| start_after.is_empty() || k.as_str() > start_after.as_str())
        .collect();
    matched.sort();

    let is_truncated = matched.len() > max_keys;
    matched.truncate(max_keys);
    let next_token = if is_truncated { matched.last().cloned() } else { None };
    (matched, is_truncated, next_token)
}
