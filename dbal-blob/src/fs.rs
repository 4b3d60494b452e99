//! Filesystem blob backend.
//!
//! Object bytes live at `{root}/{key}`; content type, etag, and custom
//! metadata live in a sidecar tree at `{root}/.meta/{key}.json`. The `.meta`
//! directory can never collide with object keys because the first key
//! segment is a tenant name, which cannot start with a dot.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dbal_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::{
    content_etag, paginate_keys, BlobList, BlobListOptions, BlobMetadata, BlobStorage,
    UploadOptions,
};

#[derive(Debug, Serialize, Deserialize)]
struct SidecarMeta {
    content_type: String,
    etag: String,
    size: u64,
    last_modified: DateTime<Utc>,
    #[serde(default)]
    custom_metadata: BTreeMap<String, String>,
}

pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn data_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn meta_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(".meta").join(format!("{key}.json")))
    }

    async fn read_sidecar(&self, key: &str) -> Result<SidecarMeta> {
        let path = self.meta_path(key)?;
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|_| Error::NotFound(format!("Blob '{key}' not found")))?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::Internal(format!("Corrupt blob metadata for '{key}': {e}")))
    }

    async fn write_sidecar(&self, key: &str, meta: &SidecarMeta) -> Result<()> {
        let path = self.meta_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Internal(format!("create metadata dir: {e}")))?;
        }
        let raw = serde_json::to_vec(meta)
            .map_err(|e| Error::Internal(format!("encode metadata: {e}")))?;
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| Error::Internal(format!("write metadata: {e}")))
    }

    fn to_metadata(key: &str, sidecar: SidecarMeta) -> BlobMetadata {
        BlobMetadata {
            key: key.to_string(),
            size: sidecar.size,
            content_type: sidecar.content_type,
            etag: sidecar.etag,
            last_modified: sidecar.last_modified,
            custom_metadata: sidecar.custom_metadata,
        }
    }

    /// Collect every object key under the root (relative, `/`-separated).
    async fn all_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        if !self.root.exists() {
            return Ok(keys);
        }

        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| Error::Internal(format!("read dir {}: {e}", dir.display())))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::Internal(format!("read dir entry: {e}")))?
            {
                let path = entry.path();
                if path.file_name().is_some_and(|n| n == ".meta") {
                    continue;
                }
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Error::Internal(format!("stat {}: {e}", path.display())))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    keys.push(path_to_key(relative));
                }
            }
        }
        Ok(keys)
    }
}

fn path_to_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Validation("Blob key must not be empty".to_string()));
    }
    let traversal = key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if traversal {
        return Err(Error::Validation(format!("Invalid blob key: {key}")));
    }
    Ok(())
}

#[async_trait::async_trait]
impl BlobStorage for FilesystemStorage {
    fn backend(&self) -> &str {
        "filesystem"
    }

    async fn upload(&self, key: &str, data: Bytes, options: &UploadOptions) -> Result<BlobMetadata> {
        let path = self.data_path(key)?;
        if !options.overwrite && path.exists() {
            return Err(Error::Conflict(format!("Blob '{key}' already exists")));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Internal(format!("create blob dir: {e}")))?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| Error::Internal(format!("write blob '{key}': {e}")))?;

        let sidecar = SidecarMeta {
            content_type: options.content_type.clone(),
            etag: content_etag(&data),
            size: data.len() as u64,
            last_modified: Utc::now(),
            custom_metadata: options.metadata.clone(),
        };
        self.write_sidecar(key, &sidecar).await?;
        Ok(Self::to_metadata(key, sidecar))
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        let path = self.data_path(key)?;
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|_| Error::NotFound(format!("Blob '{key}' not found")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.data_path(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|_| Error::NotFound(format!("Blob '{key}' not found")))?;
        let _ = tokio::fs::remove_file(self.meta_path(key)?).await;
        Ok(())
    }

    async fn metadata(&self, key: &str) -> Result<BlobMetadata> {
        let sidecar = self.read_sidecar(key).await?;
        Ok(Self::to_metadata(key, sidecar))
    }

    async fn list(&self, options: &BlobListOptions) -> Result<BlobList> {
        let keys = self.all_keys().await?;
        let (page, is_truncated, next_token) = paginate_keys(keys.into_iter(), options);

        let mut items = Vec::with_capacity(page.len());
        for key in &page {
            items.push(self.metadata(key).await?);
        }
        Ok(BlobList {
            items,
            is_truncated,
            next_token,
        })
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<BlobMetadata> {
        let data = self.download(source_key).await?;
        let sidecar = self.read_sidecar(source_key).await?;
        let options = UploadOptions {
            content_type: sidecar.content_type,
            overwrite: true,
            metadata: sidecar.custom_metadata,
        };
        self.upload(dest_key, data, &options).await
    }

    async fn presigned_url(&self, _key: &str, _expires: Duration) -> Result<String> {
        Err(Error::CapabilityNotSupported(
            "Presigned URLs are not supported by the filesystem backend".to_string(),
        ))
    }

    async fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        for key in self.all_keys().await? {
            total += self.read_sidecar(&key).await.map(|m| m.size).unwrap_or(0);
        }
        Ok(total)
    }

    async fn object_count(&self) -> Result<u64> {
        Ok(self.all_keys().await?.len() as u64)
    }
}
