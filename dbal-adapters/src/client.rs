use dbal_core::{ClientConfig, ListOptions, ListResult, Result};
use serde_json::Value;

use crate::adapter::Adapter;
use crate::factory;

/// Owned handle on one configured backend.
///
/// Construction validates the configuration before any connection is
/// attempted, so a failed `connect` can never leave a half-built client
/// behind. Entity operations forward to the adapter's generic CRUD,
/// which lets any entity defined in external schemas be served without
/// entity-specific code.
#[derive(Debug)]
pub struct Client {
    adapter: Box<dyn Adapter>,
    config: ClientConfig,
}

impl Client {
    /// Validate `config` and connect the matching adapter.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let adapter = factory::create_from_url(&config.database_url).await?;
        tracing::info!(adapter = adapter.name(), "DBAL client connected");
        Ok(Self { adapter, config })
    }

    /// Wrap an already-constructed adapter. Used by tests and embedders.
    pub fn from_adapter(adapter: Box<dyn Adapter>, config: ClientConfig) -> Self {
        Self { adapter, config }
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn create_entity(&self, entity: &str, data: Value) -> Result<Value> {
        self.adapter.create(entity, data).await
    }

    pub async fn get_entity(&self, entity: &str, id: &str) -> Result<Value> {
        self.adapter.read(entity, id).await
    }

    pub async fn update_entity(&self, entity: &str, id: &str, data: Value) -> Result<Value> {
        self.adapter.update(entity, id, data).await
    }

    pub async fn delete_entity(&self, entity: &str, id: &str) -> Result<bool> {
        self.adapter.remove(entity, id).await
    }

    pub async fn list_entities(
        &self,
        entity: &str,
        options: &ListOptions,
    ) -> Result<ListResult<Value>> {
        self.adapter.list(entity, options).await
    }

    pub async fn begin_transaction(&self) -> Result<bool> {
        self.adapter.begin_transaction().await
    }

    pub async fn commit_transaction(&self) -> Result<bool> {
        self.adapter.commit_transaction().await
    }

    pub async fn rollback_transaction(&self) -> Result<bool> {
        self.adapter.rollback_transaction().await
    }

    pub async fn close(&self) {
        if let Err(err) = self.adapter.close().await {
            tracing::warn!(error = %err, "error while closing adapter");
        }
    }
}
