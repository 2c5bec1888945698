use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::KeyValueCache;
use crate::error::StorageError;

/// Process-local cache. Each call takes the lock once, so individual
/// operations are atomic but sequences of them are not.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn add(&self, key: &str, value: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_owned(), value.to_owned());
        Ok(true)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_only_writes_missing_keys() {
        let cache = MemoryCache::new();
        assert!(cache.add("k", "1").await.unwrap());
        assert!(!cache.add("k", "2").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn delete_many_ignores_unknown_keys() {
        let cache = MemoryCache::new();
        cache.set("a", "1").await.unwrap();
        cache.set("b", "2").await.unwrap();

        cache
            .delete_many(&["a".to_owned(), "missing".to_owned()])
            .await
            .unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.get("a").await.unwrap().is_none());
    }
}
