//! In-process document store.
//!
//! Keeps every entity as an ordered id → document map behind one async
//! mutex. Transactions snapshot the whole store on `begin`; `rollback`
//! restores the snapshot and `commit` discards it.

use std::collections::{BTreeMap, HashMap};

use dbal_core::{Error, ListOptions, ListResult, Result};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::adapter::Adapter;
use crate::query;

type Store = HashMap<String, BTreeMap<String, Value>>;

#[derive(Debug)]
struct MemoryInner {
    store: Store,
    snapshot: Option<Store>,
}

#[derive(Debug)]
pub struct MemoryAdapter {
    inner: Mutex<MemoryInner>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                store: HashMap::new(),
                snapshot: None,
            }),
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, entity: &str, data: Value) -> Result<Value> {
        query::validate_entity_name(entity)?;
        let (id, doc) = query::prepare_new_document(data)?;

        let mut inner = self.inner.lock().await;
        let records = inner.store.entry(entity.to_string()).or_default();
        if records.contains_key(&id) {
            return Err(Error::Conflict(format!(
                "{entity} with id '{id}' already exists"
            )));
        }
        records.insert(id, doc.clone());
        Ok(doc)
    }

    async fn read(&self, entity: &str, id: &str) -> Result<Value> {
        let inner = self.inner.lock().await;
        inner
            .store
            .get(entity)
            .and_then(|records| records.get(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{entity} with id '{id}' not found")))
    }

    async fn update(&self, entity: &str, id: &str, data: Value) -> Result<Value> {
        let mut inner = self.inner.lock().await;
        let records = inner
            .store
            .get_mut(entity)
            .ok_or_else(|| Error::NotFound(format!("{entity} with id '{id}' not found")))?;
        let existing = records
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{entity} with id '{id}' not found")))?;

        let merged = query::merge_document(existing, data)?;
        records.insert(id.to_string(), merged.clone());
        Ok(merged)
    }

    async fn remove(&self, entity: &str, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let removed = inner
            .store
            .get_mut(entity)
            .map(|records| records.remove(id).is_some())
            .unwrap_or(false);
        if removed {
            Ok(true)
        } else {
            Err(Error::NotFound(format!("{entity} with id '{id}' not found")))
        }
    }

    async fn list(&self, entity: &str, options: &ListOptions) -> Result<ListResult<Value>> {
        let inner = self.inner.lock().await;
        let docs: Vec<Value> = inner
            .store
            .get(entity)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();
        Ok(query::apply_list_options(docs, options))
    }

    async fn begin_transaction(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.snapshot.is_some() {
            return Err(Error::Conflict("Transaction already open".to_string()));
        }
        inner.snapshot = Some(inner.store.clone());
        Ok(true)
    }

    async fn commit_transaction(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.snapshot.take().is_none() {
            return Err(Error::Conflict("No active transaction".to_string()));
        }
        Ok(true)
    }

    async fn rollback_transaction(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.snapshot.take() {
            Some(snapshot) => {
                inner.store = snapshot;
                Ok(true)
            }
            None => Err(Error::Conflict("No active transaction".to_string())),
        }
    }
}
