//! SQL backend over sqlx's `Any` driver.
//!
//! Documents are stored one table per entity as `(id VARCHAR(64) PRIMARY
//! KEY, doc TEXT)`, which keeps the layer schema-agnostic across SQLite,
//! PostgreSQL, and MySQL. CockroachDB and TiDB ride the postgres and mysql
//! wire protocols respectively. Filtering and sorting happen on the decoded
//! documents via [`crate::query`].

use std::sync::Once;

use dbal_core::{Error, ListOptions, ListResult, Result};
use serde_json::Value;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Row, Transaction};
use tokio::sync::Mutex;

use crate::adapter::Adapter;
use crate::query;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    /// The n-th bind placeholder (1-indexed) in this dialect.
    fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            _ => "?".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct SqlAdapter {
    pool: AnyPool,
    tx: Mutex<Option<Transaction<'static, Any>>>,
    dialect: Dialect,
    name: String,
}

static INSTALL_DRIVERS: Once = Once::new();

/// Rewrite a DBAL connection URL into the form sqlx expects.
fn sqlx_url(adapter_type: &str, database_url: &str) -> Result<(String, Dialect)> {
    let rest = database_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| Error::Validation(format!("Invalid database URL: {database_url}")))?;

    match adapter_type {
        "sqlite" => {
            if rest == ":memory:" {
                Ok(("sqlite::memory:".to_string(), Dialect::Sqlite))
            } else {
                // mode=rwc creates the database file on first use
                Ok((format!("sqlite:{rest}?mode=rwc"), Dialect::Sqlite))
            }
        }
        "postgres" | "cockroachdb" => Ok((format!("postgres://{rest}"), Dialect::Postgres)),
        "mysql" | "tidb" => Ok((format!("mysql://{rest}"), Dialect::MySql)),
        other => Err(Error::CapabilityNotSupported(format!(
            "No SQL dialect for adapter '{other}'"
        ))),
    }
}

fn map_sqlx_error(context: &str, err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::Conflict(format!("{context}: duplicate key"))
        }
        sqlx::Error::PoolTimedOut => Error::Timeout(format!("{context}: pool timed out")),
        _ => Error::Database(format!("{context}: {err}")),
    }
}

impl SqlAdapter {
    /// Connect to the backend behind `database_url`.
    pub async fn connect(adapter_type: &str, database_url: &str) -> Result<Self> {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let (url, dialect) = sqlx_url(adapter_type, database_url)?;

        // A pooled in-memory SQLite database is a fresh database per
        // connection, so the pool must stay at one connection.
        let max_connections = if dialect == Dialect::Sqlite { 1 } else { 5 };

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        tracing::debug!(adapter = adapter_type, "SQL adapter connected");

        Ok(Self {
            pool,
            tx: Mutex::new(None),
            dialect,
            name: adapter_type.to_string(),
        })
    }

    async fn execute(&self, sql: &str, binds: &[&str]) -> Result<u64> {
        let mut q = sqlx::query(sql);
        for bind in binds {
            q = q.bind(*bind);
        }
        let mut tx = self.tx.lock().await;
        let result = match tx.as_mut() {
            Some(tx) => q.execute(&mut **tx).await,
            None => q.execute(&self.pool).await,
        };
        result
            .map(|r| r.rows_affected())
            .map_err(|e| map_sqlx_error(sql, e))
    }

    async fn fetch_optional(&self, sql: &str, binds: &[&str]) -> Result<Option<AnyRow>> {
        let mut q = sqlx::query(sql);
        for bind in binds {
            q = q.bind(*bind);
        }
        let mut tx = self.tx.lock().await;
        let result = match tx.as_mut() {
            Some(tx) => q.fetch_optional(&mut **tx).await,
            None => q.fetch_optional(&self.pool).await,
        };
        result.map_err(|e| map_sqlx_error(sql, e))
    }

    async fn fetch_all(&self, sql: &str) -> Result<Vec<AnyRow>> {
        let q = sqlx::query(sql);
        let mut tx = self.tx.lock().await;
        let result = match tx.as_mut() {
            Some(tx) => q.fetch_all(&mut **tx).await,
            None => q.fetch_all(&self.pool).await,
        };
        result.map_err(|e| map_sqlx_error(sql, e))
    }

    async fn ensure_table(&self, entity: &str) -> Result<()> {
        query::validate_entity_name(entity)?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {entity} (id VARCHAR(64) PRIMARY KEY, doc TEXT NOT NULL)"
        );
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    fn decode_doc(entity: &str, row: &AnyRow) -> Result<Value> {
        let text: String = row
            .try_get(0)
            .map_err(|e| Error::Database(format!("decode {entity} row: {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Database(format!("stored {entity} document is not JSON: {e}")))
    }
}

#[async_trait::async_trait]
impl Adapter for SqlAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self, entity: &str, data: Value) -> Result<Value> {
        self.ensure_table(entity).await?;
        let (id, doc) = query::prepare_new_document(data)?;
        let text = doc.to_string();

        let sql = format!(
            "INSERT INTO {entity} (id, doc) VALUES ({}, {})",
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        );
        self.execute(&sql, &[id.as_str(), text.as_str()])
            .await
            .map_err(|e| match e {
                Error::Conflict(_) => Error::Conflict(format!("{entity} with id '{id}' already exists")),
                other => other,
            })?;
        Ok(doc)
    }

    async fn read(&self, entity: &str, id: &str) -> Result<Value> {
        self.ensure_table(entity).await?;
        let sql = format!(
            "SELECT doc FROM {entity} WHERE id = {}",
            self.dialect.placeholder(1)
        );
        match self.fetch_optional(&sql, &[id]).await? {
            Some(row) => Self::decode_doc(entity, &row),
            None => Err(Error::NotFound(format!("{entity} with id '{id}' not found"))),
        }
    }

    async fn update(&self, entity: &str, id: &str, data: Value) -> Result<Value> {
        let existing = self.read(entity, id).await?;
        let merged = query::merge_document(existing, data)?;
        let text = merged.to_string();

        let sql = format!(
            "UPDATE {entity} SET doc = {} WHERE id = {}",
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        );
        self.execute(&sql, &[text.as_str(), id]).await?;
        Ok(merged)
    }

    async fn remove(&self, entity: &str, id: &str) -> Result<bool> {
        self.ensure_table(entity).await?;
        let sql = format!(
            "DELETE FROM {entity} WHERE id = {}",
            self.dialect.placeholder(1)
        );
        let affected = self.execute(&sql, &[id]).await?;
        if affected == 0 {
            return Err(Error::NotFound(format!("{entity} with id '{id}' not found")));
        }
        Ok(true)
    }

    async fn list(&self, entity: &str, options: &ListOptions) -> Result<ListResult<Value>> {
        self.ensure_table(entity).await?;
        let sql = format!("SELECT doc FROM {entity}");
        let rows = self.fetch_all(&sql).await?;
        let docs = rows
            .iter()
            .map(|row| Self::decode_doc(entity, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(query::apply_list_options(docs, options))
    }

    async fn begin_transaction(&self) -> Result<bool> {
        let mut tx = self.tx.lock().await;
        if tx.is_some() {
            return Err(Error::Conflict("Transaction already open".to_string()));
        }
        *tx = Some(
            self.pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("begin", e))?,
        );
        Ok(true)
    }

    async fn commit_transaction(&self) -> Result<bool> {
        let mut tx = self.tx.lock().await;
        match tx.take() {
            Some(tx) => {
                tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
                Ok(true)
            }
            None => Err(Error::Conflict("No active transaction".to_string())),
        }
    }

    async fn rollback_transaction(&self) -> Result<bool> {
        let mut tx = self.tx.lock().await;
        match tx.take() {
            Some(tx) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                Ok(true)
            }
            None => Err(Error::Conflict("No active transaction".to_string())),
        }
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
