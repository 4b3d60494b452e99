use dbal_core::{ListOptions, ListResult, Result};
use serde_json::Value;

/// The uniform capability set every storage backend implements.
///
/// Documents are semi-structured JSON objects keyed by a string `id`.
/// Transaction control is adapter-scoped: `begin` opens one scope, and the
/// scope is terminal after `commit` or `rollback`.
#[async_trait::async_trait]
pub trait Adapter: Send + Sync + std::fmt::Debug {
    /// Canonical backend tag (`sqlite`, `postgres`, ...).
    fn name(&self) -> &str;

    async fn create(&self, entity: &str, data: Value) -> Result<Value>;
    async fn read(&self, entity: &str, id: &str) -> Result<Value>;
    async fn update(&self, entity: &str, id: &str, data: Value) -> Result<Value>;
    async fn remove(&self, entity: &str, id: &str) -> Result<bool>;
    async fn list(&self, entity: &str, options: &ListOptions) -> Result<ListResult<Value>>;

    async fn begin_transaction(&self) -> Result<bool>;
    async fn commit_transaction(&self) -> Result<bool>;
    async fn rollback_transaction(&self) -> Result<bool>;

    /// Release backend resources. Safe to call more than once.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
