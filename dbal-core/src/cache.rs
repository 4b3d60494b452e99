//! TTL cache for entity metadata.
//!
//! Entries are never evicted: an overwrite refreshes them, invalidation
//! rewinds their expiry to now, and expired lookups count as misses while
//! the stale value stays in place for the next overwrite.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

struct CacheEntry<T> {
    value: T,
    expiry: Instant,
}

impl<T> CacheEntry<T> {
    fn expired(&self) -> bool {
        Instant::now() >= self.expiry
    }
}

struct CacheInner {
    available_entities: CacheEntry<Vec<String>>,
    entity_schemas: HashMap<String, CacheEntry<Value>>,
    hits: u64,
    misses: u64,
}

/// Thread-safe, TTL-expiring cache of entity names and schemas.
pub struct MetadataCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
}

impl MetadataCache {
    pub const DEFAULT_TTL_SECONDS: u64 = 300;

    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                available_entities: CacheEntry {
                    value: Vec::new(),
                    expiry: Instant::now(),
                },
                entity_schemas: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
            ttl,
        }
    }

    pub fn cache_available_entities(&self, entities: Vec<String>) {
        let mut inner = self.lock();
        inner.available_entities = CacheEntry {
            value: entities,
            expiry: Instant::now() + self.ttl,
        };
    }

    /// Cached entity names, or an empty list on a miss.
    pub fn available_entities(&self) -> Vec<String> {
        let mut inner = self.lock();
        if inner.available_entities.expired() {
            inner.misses += 1;
            return Vec::new();
        }
        inner.hits += 1;
        inner.available_entities.value.clone()
    }

    pub fn has_available_entities(&self) -> bool {
        !self.lock().available_entities.expired()
    }

    pub fn cache_entity_schema(&self, entity_name: &str, schema: Value) {
        let mut inner = self.lock();
        let expiry = Instant::now() + self.ttl;
        inner
            .entity_schemas
            .insert(entity_name.to_string(), CacheEntry { value: schema, expiry });
    }

    /// Cached schema for one entity, or an empty object on a miss.
    pub fn entity_schema(&self, entity_name: &str) -> Value {
        let mut inner = self.lock();
        let fresh = inner
            .entity_schemas
            .get(entity_name)
            .filter(|entry| !entry.expired())
            .map(|entry| entry.value.clone());
        match fresh {
            Some(value) => {
                inner.hits += 1;
                value
            }
            None => {
                inner.misses += 1;
                json!({})
            }
        }
    }

    pub fn has_entity_schema(&self, entity_name: &str) -> bool {
        self.lock()
            .entity_schemas
            .get(entity_name)
            .map(|entry| !entry.expired())
            .unwrap_or(false)
    }

    /// Expire every entry without erasing it.
    pub fn invalidate_all(&self) {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.available_entities.expiry = now;
        for entry in inner.entity_schemas.values_mut() {
            entry.expiry = now;
        }
    }

    /// Expire one schema entry without erasing it.
    pub fn invalidate_schema(&self, entity_name: &str) {
        let mut inner = self.lock();
        if let Some(entry) = inner.entity_schemas.get_mut(entity_name) {
            entry.expiry = Instant::now();
        }
    }

    pub fn statistics(&self) -> Value {
        let inner = self.lock();
        let total = inner.hits + inner.misses;
        json!({
            "hits": inner.hits,
            "misses": inner.misses,
            "hit_rate": if total > 0 { inner.hits as f64 / total as f64 } else { 0.0 },
            "cached_entities": inner.entity_schemas.len(),
            "has_available_entities": !inner.available_entities.expired(),
            "ttl_seconds": self.ttl.as_secs(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // A poisoned cache mutex means a panic mid-insert; the data is
        // plain values, so continuing with it is sound.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(Self::DEFAULT_TTL_SECONDS))
    }
}
