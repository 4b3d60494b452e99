//! In-process blob store.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use dbal_core::{Error, Result};

use crate::{
    content_etag, paginate_keys, BlobList, BlobListOptions, BlobMetadata, BlobStorage,
    UploadOptions,
};

struct StoredBlob {
    data: Bytes,
    meta: BlobMetadata,
}

pub struct MemoryStorage {
    blobs: Mutex<BTreeMap<String, StoredBlob>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredBlob>> {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BlobStorage for MemoryStorage {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn upload(&self, key: &str, data: Bytes, options: &UploadOptions) -> Result<BlobMetadata> {
        if key.is_empty() {
            return Err(Error::Validation("Blob key must not be empty".to_string()));
        }

        let mut blobs = self.lock();
        if !options.overwrite && blobs.contains_key(key) {
            return Err(Error::Conflict(format!("Blob '{key}' already exists")));
        }

        let meta = BlobMetadata {
            key: key.to_string(),
            size: data.len() as u64,
            content_type: options.content_type.clone(),
            etag: content_etag(&data),
            last_modified: Utc::now(),
            custom_metadata: options.metadata.clone(),
        };
        blobs.insert(key.to_string(), StoredBlob { data, meta: meta.clone() });
        Ok(meta)
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        self.lock()
            .get(key)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| Error::NotFound(format!("Blob '{key}' not found")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.lock().remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("Blob '{key}' not found"))),
        }
    }

    async fn metadata(&self, key: &str) -> Result<BlobMetadata> {
        self.lock()
            .get(key)
            .map(|blob| blob.meta.clone())
            .ok_or_else(|| Error::NotFound(format!("Blob '{key}' not found")))
    }

    async fn list(&self, options: &BlobListOptions) -> Result<BlobList> {
        let blobs = self.lock();
        let (keys, is_truncated, next_token) =
            paginate_keys(blobs.keys().cloned(), options);
        let items = keys
            .iter()
            .filter_map(|k| blobs.get(k).map(|b| b.meta.clone()))
            .collect();
        Ok(BlobList {
            items,
            is_truncated,
            next_token,
        })
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<BlobMetadata> {
        let mut blobs = self.lock();
        let source = blobs
            .get(source_key)
            .ok_or_else(|| Error::NotFound(format!("Blob '{source_key}' not found")))?;

        let meta = BlobMetadata {
            key: dest_key.to_string(),
            last_modified: Utc::now(),
            ..source.meta.clone()
        };
        let data = source.data.clone();
        blobs.insert(dest_key.to_string(), StoredBlob { data, meta: meta.clone() });
        Ok(meta)
    }

    async fn presigned_url(&self, _key: &str, _expires: Duration) -> Result<String> {
        Err(Error::CapabilityNotSupported(
            "Presigned URLs are not supported by the memory backend".to_string(),
        ))
    }

    async fn total_size(&self) -> Result<u64> {
        Ok(self.lock().values().map(|b| b.meta.size).sum())
    }

    async fn object_count(&self) -> Result<u64> {
        Ok(self.lock().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> UploadOptions {
        UploadOptions::default()
    }

    #[tokio::test]
    async fn upload_download_round_trip_is_byte_equal() {
        let store = MemoryStorage::new();
        let body = Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let meta = store.upload("acme/forum/x.bin", body.clone(), &opts()).await.unwrap();
        assert_eq!(meta.size, 4);

        let fetched = store.download("acme/forum/x.bin").await.unwrap();
        assert_eq!(fetched, body);

        let head = store.metadata("acme/forum/x.bin").await.unwrap();
        assert_eq!(head, meta);
    }

    #[tokio::test]
    async fn overwrite_false_conflicts_on_existing_key() {
        let store = MemoryStorage::new();
        store.upload("k", Bytes::from_static(b"a"), &opts()).await.unwrap();

        let no_overwrite = UploadOptions { overwrite: false, ..opts() };
        let err = store.upload("k", Bytes::from_static(b"b"), &no_overwrite).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn etag_is_stable_across_reads_and_changes_on_rewrite() {
        let store = MemoryStorage::new();
        store.upload("k", Bytes::from_static(b"one"), &opts()).await.unwrap();
        let first = store.metadata("k").await.unwrap().etag;
        assert_eq!(store.metadata("k").await.unwrap().etag, first);

        store.upload("k", Bytes::from_static(b"two"), &opts()).await.unwrap();
        assert_ne!(store.metadata("k").await.unwrap().etag, first);
    }

    #[tokio::test]
    async fn list_pages_through_prefix() {
        let store = MemoryStorage::new();
        for i in 0..5 {
            store
                .upload(&format!("acme/forum/f{i}"), Bytes::from_static(b"x"), &opts())
                .await
                .unwrap();
        }
        store.upload("globex/forum/f0", Bytes::from_static(b"x"), &opts()).await.unwrap();

        let options = BlobListOptions {
            prefix: "acme/forum/".to_string(),
            max_keys: Some(2),
            ..Default::default()
        };
        let page1 = store.list(&options).await.unwrap();
        assert_eq!(page1.items.len(), 2);
        assert!(page1.is_truncated);

        let page2 = store
            .list(&BlobListOptions {
                continuation_token: page1.next_token.clone(),
                ..options
            })
            .await
            .unwrap();
        assert_eq!(page2.items.len(), 2);
        assert!(page2.items[0].key > page1.items[1].key);
    }

    #[tokio::test]
    async fn stats_and_delete() {
        let store = MemoryStorage::new();
        store.upload("a", Bytes::from_static(b"12345"), &opts()).await.unwrap();
        store.upload("b", Bytes::from_static(b"123"), &opts()).await.unwrap();
        assert_eq!(store.total_size().await.unwrap(), 8);
        assert_eq!(store.object_count().await.unwrap(), 2);

        store.delete("a").await.unwrap();
        assert!(matches!(store.delete("a").await, Err(Error::NotFound(_))));
        assert_eq!(store.object_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn copy_duplicates_content_under_new_key() {
        let store = MemoryStorage::new();
        store.upload("src", Bytes::from_static(b"payload"), &opts()).await.unwrap();
        let meta = store.copy("src", "dst").await.unwrap();
        assert_eq!(meta.key, "dst");
        assert_eq!(store.download("dst").await.unwrap(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn presign_reports_capability_not_supported() {
        let store = MemoryStorage::new();
        store.upload("k", Bytes::from_static(b"x"), &opts()).await.unwrap();
        let err = store.presigned_url("k", Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, Error::CapabilityNotSupported(_)));
    }
}
