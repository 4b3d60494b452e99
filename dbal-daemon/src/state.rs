//! Service state shared across requests.
//!
//! The active client is created lazily on first use and replaced atomically
//! by a successful switch; requests that already hold a handle keep running
//! against the adapter they started with. Scalar config lives behind its
//! own mutex so `/admin/config` readers never contend with the client slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dbal_adapters::Client;
use dbal_blob::BlobStorage;
use dbal_core::{ClientConfig, MetadataCache, Result};

use crate::config::ServiceConfig;
use crate::limit::RateLimiter;

struct ActiveConfig {
    adapter: String,
    database_url: String,
    mode: String,
    endpoint: String,
}

pub struct ServiceState {
    config: Mutex<ActiveConfig>,
    sandbox_enabled: AtomicBool,
    client: tokio::sync::Mutex<Option<Arc<Client>>>,
    pub metadata_cache: MetadataCache,
    pub admin_limiter: RateLimiter,
    pub mutation_limiter: RateLimiter,
    pub read_limiter: RateLimiter,
    pub blob: Arc<dyn BlobStorage>,
    pub settings: ServiceConfig,
}

/// Cloneable handle on the daemon's shared state.
#[derive(Clone)]
pub struct AppState(Arc<ServiceState>);

impl std::ops::Deref for AppState {
    type Target = ServiceState;

    fn deref(&self) -> &ServiceState {
        &self.0
    }
}

impl AppState {
    pub fn new(settings: ServiceConfig, blob: Arc<dyn BlobStorage>) -> Self {
        let client = &settings.client;
        Self(Arc::new(ServiceState {
            config: Mutex::new(ActiveConfig {
                adapter: client.adapter.clone(),
                database_url: client.database_url.clone(),
                mode: client.mode.clone(),
                endpoint: client.endpoint.clone(),
            }),
            sandbox_enabled: AtomicBool::new(client.sandbox_enabled),
            client: tokio::sync::Mutex::new(None),
            metadata_cache: MetadataCache::default(),
            admin_limiter: RateLimiter::new(10, 60),
            mutation_limiter: RateLimiter::new(50, 60),
            read_limiter: RateLimiter::new(100, 60),
            blob,
            settings,
        }))
    }

    /// Install a pre-built client, bypassing the factory. Used by tests.
    pub async fn install_client(&self, client: Client) {
        *self.client.lock().await = Some(Arc::new(client));
    }

    fn config_snapshot(&self) -> ClientConfig {
        let config = self.lock_config();
        ClientConfig {
            mode: config.mode.clone(),
            adapter: config.adapter.clone(),
            endpoint: config.endpoint.clone(),
            database_url: config.database_url.clone(),
            sandbox_enabled: self.sandbox_enabled.load(Ordering::Relaxed),
        }
    }

    /// The active `(adapter, database_url)` pair.
    pub fn active_config(&self) -> (String, String) {
        let config = self.lock_config();
        (config.adapter.clone(), config.database_url.clone())
    }

    /// Hand out the active client, constructing it on first use.
    ///
    /// Linearizable with respect to [`switch_adapter`](Self::switch_adapter):
    /// callers that got their handle before a swap finish against the old
    /// adapter, callers arriving after the swap see the new one.
    pub async fn ensure_client(&self) -> Result<Arc<Client>> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        tracing::info!("initializing DBAL client");
        let client = Client::connect(self.config_snapshot()).await.map_err(|err| {
            tracing::error!(error = %err, "failed to initialize DBAL client");
            err
        })?;
        let client = Arc::new(client);
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Replace the active adapter. Returns false (old adapter untouched)
    /// when the candidate cannot be constructed.
    pub async fn switch_adapter(&self, adapter: &str, database_url: &str) -> bool {
        tracing::info!(adapter, "switching adapter");

        let mut slot = self.client.lock().await;

        let mut candidate_config = self.config_snapshot();
        candidate_config.adapter = adapter.to_string();
        candidate_config.database_url = database_url.to_string();

        let candidate = match Client::connect(candidate_config).await {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "switch_adapter failed");
                return false;
            }
        };

        if let Some(old) = slot.replace(Arc::new(candidate)) {
            old.close().await;
        }
        {
            let mut config = self.lock_config();
            config.adapter = adapter.to_string();
            config.database_url = database_url.to_string();
        }
        self.metadata_cache.invalidate_all();

        tracing::info!(adapter, "switch_adapter succeeded");
        true
    }

    /// Construct a transient client and drop it, without touching state.
    pub async fn test_connection(&self, adapter: &str, database_url: &str) -> Result<()> {
        let mut config = self.config_snapshot();
        config.adapter = adapter.to_string();
        config.database_url = database_url.to_string();

        let client = Client::connect(config).await?;
        client.close().await;
        Ok(())
    }

    pub fn sandbox_enabled(&self) -> bool {
        self.sandbox_enabled.load(Ordering::Relaxed)
    }

    fn lock_config(&self) -> std::sync::MutexGuard<'_, ActiveConfig> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Replace the password span of a connection URL with `***`.
pub fn redact_database_url(url: &str) -> String {
    let Some(at) = url.find('@') else {
        return url.to_string();
    };
    let auth_start = url.find("://").map(|p| p + 3).unwrap_or(0);
    match url[auth_start..at].find(':') {
        Some(colon) => {
            let colon = auth_start + colon;
            format!("{}:***{}", &url[..colon], &url[at..])
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_password_between_colon_and_at() {
        assert_eq!(
            redact_database_url("postgres://user:s3cret@db:5432/app"),
            "postgres://user:***@db:5432/app"
        );
        assert_eq!(
            redact_database_url("postgres://user@db:5432/app"),
            "postgres://user@db:5432/app"
        );
        assert_eq!(redact_database_url("sqlite://:memory:"), "sqlite://:memory:");
    }

    fn test_state(url: &str) -> AppState {
        let settings = ServiceConfig {
            client: ClientConfig {
                adapter: "sqlite".to_string(),
                database_url: url.to_string(),
                sandbox_enabled: true,
                ..Default::default()
            },
            address: "127.0.0.1:8080".to_string(),
            admin_token: None,
            cors_origin: "http://localhost:3000".to_string(),
            schema_registry_path: "/tmp/registry.json".into(),
            packages_path: "/tmp/packages".into(),
            schema_output_path: "/tmp/out.prisma".into(),
            seed_dir: None,
        };
        AppState::new(settings, Arc::new(dbal_blob::MemoryStorage::new()))
    }

    #[tokio::test]
    async fn ensure_client_is_lazy_and_reused() {
        let state = test_state("sqlite://:memory:");
        let first = state.ensure_client().await.unwrap();
        let second = state.ensure_client().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn failed_switch_keeps_previous_config() {
        let state = test_state("sqlite://:memory:");
        state.ensure_client().await.unwrap();

        let before = state.active_config();
        // mongodb has no linked driver, so construction fails
        assert!(!state.switch_adapter("mongodb", "mongodb://localhost:27017/x").await);
        assert_eq!(state.active_config(), before);
    }

    #[tokio::test]
    async fn successful_switch_updates_config() {
        let state = test_state("sqlite://:memory:");
        state.ensure_client().await.unwrap();

        assert!(state.switch_adapter("sqlite", "sqlite://:memory:").await);
        let (adapter, url) = state.active_config();
        assert_eq!(adapter, "sqlite");
        assert_eq!(url, "sqlite://:memory:");
    }

    #[tokio::test]
    async fn test_connection_does_not_mutate_state() {
        let state = test_state("sqlite://:memory:");
        let before = state.active_config();

        assert!(state.test_connection("sqlite", "sqlite://:memory:").await.is_ok());
        assert!(state.test_connection("mongodb", "mongodb://h/x").await.is_err());
        assert_eq!(state.active_config(), before);
    }
}
