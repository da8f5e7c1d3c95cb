//! Adapter cache keyed by connection identity.
//!
//! One adapter (and thus one pool) exists per distinct cache key. Keys are
//! derived from the connection's identity fields, so two aliases pointing
//! at the same endpoint share a pool.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::db::DriverAdapter;
use crate::models::ConnectionConfig;

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    adapters: Arc<RwLock<HashMap<String, Arc<DriverAdapter>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the adapter for a config. Creation is cheap (no I/O),
    /// so it happens under the write lock without a double-check dance.
    pub async fn get(&self, config: &ConnectionConfig) -> Arc<DriverAdapter> {
        let key = config.cache_key();
        {
            let adapters = self.adapters.read().await;
            if let Some(adapter) = adapters.get(&key) {
                return Arc::clone(adapter);
            }
        }

        let mut adapters = self.adapters.write().await;
        let adapter = adapters.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "Caching new adapter");
            Arc::new(DriverAdapter::new(config.clone()))
        });
        Arc::clone(adapter)
    }

    /// Drop a cached adapter so the next request builds a fresh one. The
    /// retry path calls this after a transient failure.
    pub async fn evict(&self, config: &ConnectionConfig) {
        let key = config.cache_key();
        let removed = {
            let mut adapters = self.adapters.write().await;
            adapters.remove(&key)
        };
        if let Some(adapter) = removed {
            info!(key = %key, "Evicting adapter");
            adapter.close().await;
        }
    }

    /// Close every cached adapter and clear the cache.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<DriverAdapter>)> = {
            let mut adapters = self.adapters.write().await;
            adapters.drain().collect()
        };
        for (key, adapter) in drained {
            info!(key = %key, "Closing adapter");
            adapter.close().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.adapters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.adapters.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackendType;

    fn config(host: &str) -> ConnectionConfig {
        let mut c = ConnectionConfig::new(BackendType::MySql, host);
        c.user = Some("app".to_string());
        c.database = Some("sales".to_string());
        c
    }

    #[tokio::test]
    async fn test_get_caches_by_identity() {
        let registry = ConnectionRegistry::new();
        let a = registry.get(&config("db.internal")).await;
        let b = registry.get(&config("db.internal")).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_hosts_get_distinct_adapters() {
        let registry = ConnectionRegistry::new();
        let a = registry.get(&config("one")).await;
        let b = registry.get(&config("two")).await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_password_change_does_not_split_cache() {
        let registry = ConnectionRegistry::new();
        let mut first = config("db.internal");
        first.password = Some("old".to_string());
        let mut second = config("db.internal");
        second.password = Some("new".to_string());
        let a = registry.get(&first).await;
        let b = registry.get(&second).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_evict_forces_rebuild() {
        let registry = ConnectionRegistry::new();
        let before = registry.get(&config("db.internal")).await;
        registry.evict(&config("db.internal")).await;
        assert!(registry.is_empty().await);
        let after = registry.get(&config("db.internal")).await;
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_close_all_clears_cache() {
        let registry = ConnectionRegistry::new();
        registry.get(&config("one")).await;
        registry.get(&config("two")).await;
        registry.close_all().await;
        assert!(registry.is_empty().await);
    }
}
