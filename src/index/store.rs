//! Index Store Module
//!
//! The `IndexStore` contract and its bundled in-memory backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{CacheError, Result};
use crate::index::{current_timestamp_ms, StoredItem, MAX_INDEX_KEY_LENGTH};

// == Index Store Trait ==
/// Durable key-value store with TTL and an optional create-uniqueness flag.
///
/// Items are JSON documents. Expired items behave exactly like absent ones.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Returns the item, or `NotFound`.
    async fn get(&self, key: &str) -> Result<Value>;

    /// Soft lookup: absence is not an error.
    async fn exists(&self, key: &str) -> Result<Option<Value>>;

    /// Writes an item. With `unique_create`, fails `AlreadyExists` when a
    /// live item is already stored under `key`; otherwise overwrites.
    async fn put(
        &self,
        key: &str,
        item: Value,
        ttl: Option<Duration>,
        unique_create: bool,
    ) -> Result<()>;

    /// Removes an item. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}

// == Typed Index ==
/// Typed view over an `IndexStore`.
#[derive(Clone)]
pub struct Index {
    store: Arc<dyn IndexStore>,
}

impl Index {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self { store }
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.store.get(key).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn exists_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.exists(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn put_as<T: Serialize>(
        &self,
        key: &str,
        record: &T,
        ttl: Option<Duration>,
        unique_create: bool,
    ) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.store.put(key, value, ttl, unique_create).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key).await
    }
}

// == Memory Index Store ==
/// In-process index backend.
#[derive(Debug, Default)]
pub struct MemoryIndexStore {
    /// Key-item storage
    entries: RwLock<HashMap<String, StoredItem>>,
}

impl MemoryIndexStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Cleanup Expired ==
    /// Removes all expired items.
    ///
    /// Returns the number of items removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, item| !item.is_expired_at(now));
        before - entries.len()
    }

    // == Length ==
    /// Returns the number of stored items, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn live(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|item| !item.is_expired())
            .map(|item| item.value.clone())
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn get(&self, key: &str) -> Result<Value> {
        self.live(key)
            .await
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.live(key).await)
    }

    async fn put(
        &self,
        key: &str,
        item: Value,
        ttl: Option<Duration>,
        unique_create: bool,
    ) -> Result<()> {
        if key.is_empty() || key.len() > MAX_INDEX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "Index key must be 1..={} bytes",
                MAX_INDEX_KEY_LENGTH
            )));
        }

        // Check and insert under one write guard so unique creates cannot race
        let mut entries = self.entries.write().await;
        if unique_create {
            if let Some(existing) = entries.get(key) {
                if !existing.is_expired() {
                    return Err(CacheError::AlreadyExists(key.to_string()));
                }
            }
        }
        entries.insert(key.to_string(), StoredItem::new(item, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
