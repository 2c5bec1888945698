use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::record::{sort_entries, AggregateRecord, Measurement, OrderBy, ProfileEntry};
use super::Storage;
use crate::cache::KeyValueCache;
use crate::error::StorageError;

// ─── Keys ────────────────────────────────────────────────────────

const KEY_PREFIX: &str = "speedinfo";

/// The cache can't enumerate keys, so the live ones are listed here.
pub const INDEX_KEY: &str = "speedinfo:indexes";

/// Store backed by a shared key-value cache.
///
/// Each record is a JSON blob under `speedinfo.<len>:<endpoint>.<method>`,
/// where `<len>` is the byte length of the endpoint name; the index key
/// holds a JSON list of every record key.
///
/// `add` is a read-modify-write with no locking. Two workers adding to the
/// same key at the same moment can both read the old value, and the later
/// write wins, so increments may be lost under contention. The index update
/// has the same window. Use [`super::TableStorage`] when exact counts matter.
pub struct CacheStorage {
    cache: Arc<dyn KeyValueCache>,
}

impl CacheStorage {
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self { cache }
    }

    /// Both parts may contain dots, so the endpoint length keeps distinct
    /// pairs from mapping to the same key.
    pub fn record_key(endpoint_name: &str, method: &str) -> String {
        format!("{KEY_PREFIX}.{}:{endpoint_name}.{method}", endpoint_name.len())
    }

    /// Current index. A missing index is created empty first.
    async fn indexes(&self) -> Result<Vec<String>, StorageError> {
        if let Some(raw) = self.cache.get(INDEX_KEY).await? {
            return Ok(serde_json::from_str(&raw)?);
        }

        self.cache.add(INDEX_KEY, "[]").await?;
        match self.cache.get(INDEX_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            // Reset raced us between the add and the get
            None => Ok(Vec::new()),
        }
    }

    async fn add_index(&self, key: &str) -> Result<(), StorageError> {
        let mut keys = self.indexes().await?;
        if keys.iter().any(|k| k == key) {
            return Ok(());
        }
        keys.push(key.to_owned());
        self.cache.set(INDEX_KEY, &serde_json::to_string(&keys)?).await
    }

    async fn load(&self, key: &str) -> Result<Option<AggregateRecord>, StorageError> {
        match self.cache.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, key: &str, record: &AggregateRecord) -> Result<(), StorageError> {
        self.cache.set(key, &serde_json::to_string(record)?).await
    }
}

#[async_trait]
impl Storage for CacheStorage {
    async fn add(&self, m: &Measurement) -> Result<(), StorageError> {
        m.validate()?;
        let key = Self::record_key(&m.endpoint_name, &m.method);

        let mut record = match self.load(&key).await? {
            Some(record) => record,
            None => {
                debug!(key = %key, "first observation, creating cache entry");
                let record = AggregateRecord::empty(&m.endpoint_name, &m.method);
                self.store(&key, &record).await?;
                self.add_index(&key).await?;
                record
            }
        };

        record.apply(m);
        self.store(&key, &record).await
    }

    async fn fetch_all(&self, ordering: &[OrderBy]) -> Result<Vec<ProfileEntry>, StorageError> {
        let keys = self.indexes().await?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in &keys {
            // Entries can vanish under a concurrent reset; skip them
            if let Some(record) = self.load(key).await? {
                entries.push(ProfileEntry::from(record));
            }
        }

        sort_entries(&mut entries, ordering);
        Ok(entries)
    }

    async fn reset(&self) -> Result<(), StorageError> {
        let mut keys = self.indexes().await?;
        keys.push(INDEX_KEY.to_owned());
        debug!(count = keys.len(), "deleting cache entries");
        self.cache.delete_many(&keys).await
    }
}
