//! In-memory store catalog, indexed by store id, with thread-safe access
//! and async population from the stores repository.
//!
//! The catalog is fetched once at session start and is read-only
//! afterwards; an empty catalog is a valid state in which no store can be
//! selected.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use model::Store;
use repository::StoresRepository;
use tokio::sync::RwLock;
use tracing::warn;

/// Thread-safe in-memory store index.
#[derive(Debug, Default)]
pub struct StoreCatalog {
    inner: Arc<RwLock<HashMap<String, Store>>>,
}

impl StoreCatalog {
    /// Create a new, empty catalog.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replace the catalog contents with every store from the repository.
    ///
    /// Stores with out-of-range coordinates are skipped with a warning
    /// rather than poisoning later distance checks.
    ///
    /// Returns the number of stores loaded.
    pub async fn load<R>(&self, stores_repo: &R) -> Result<usize>
    where
        R: StoresRepository + Sync,
    {
        let stores = stores_repo.get_all().await?;

        let mut map = HashMap::with_capacity(stores.len());
        for store in stores {
            if !store.has_valid_coordinates() {
                warn!(
                    store_id = %store.id,
                    "Skipping store with out-of-range coordinates"
                );
                continue;
            }
            map.insert(store.id.clone(), store);
        }

        let count = map.len();
        let mut inner = self.inner.write().await;
        *inner = map;
        Ok(count)
    }

    /// Get a cloned store by its id (None if not known).
    pub async fn get(&self, store_id: &str) -> Option<Store> {
        let map = self.inner.read().await;
        map.get(store_id).cloned()
    }

    /// Insert or update a single store.
    pub async fn set(&self, store: Store) {
        let mut map = self.inner.write().await;
        map.insert(store.id.clone(), store);
    }

    /// All stores, sorted by name for stable map rendering.
    pub async fn all(&self) -> Vec<Store> {
        let map = self.inner.read().await;
        let mut stores: Vec<Store> = map.values().cloned().collect();
        stores.sort_by(|a, b| a.name.cmp(&b.name));
        stores
    }

    /// Number of stores currently loaded.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store(id: &str, name: &str) -> Store {
        Store {
            id: id.to_string(),
            name: name.to_string(),
            address: "12 Rue de Rivoli, Paris".to_string(),
            latitude: 48.8566,
            longitude: 2.3522,
        }
    }

    #[tokio::test]
    async fn test_empty_catalog() {
        let catalog = StoreCatalog::new();
        assert!(catalog.get("nonexistent").await.is_none());
        assert!(catalog.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_and_get_store() {
        let catalog = StoreCatalog::new();
        catalog.set(sample_store("store-1", "Centrale")).await;
        let got = catalog.get("store-1").await;
        assert!(got.is_some());
        assert_eq!(got.unwrap().name, "Centrale");
        assert_eq!(catalog.len().await, 1);
    }

    #[tokio::test]
    async fn test_all_is_sorted_by_name() {
        let catalog = StoreCatalog::new();
        catalog.set(sample_store("store-2", "Zola")).await;
        catalog.set(sample_store("store-1", "Aligre")).await;
        let all = catalog.all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Aligre");
        assert_eq!(all[1].name, "Zola");
    }

    #[tokio::test]
    async fn test_set_replaces_existing() {
        let catalog = StoreCatalog::new();
        catalog.set(sample_store("store-1", "Old Name")).await;
        catalog.set(sample_store("store-1", "New Name")).await;
        assert_eq!(catalog.len().await, 1);
        assert_eq!(catalog.get("store-1").await.unwrap().name, "New Name");
    }
}
