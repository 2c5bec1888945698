//! Aggregation storage engine.
//!
//! Every backend keeps at most one [`AggregateRecord`] per
//! `(endpoint_name, method)` pair and accepts concurrent `add` calls from
//! any number of request workers. The backends differ in how strongly they
//! guarantee that no increment is lost:
//!
//! - [`CacheStorage`] does a read-modify-write through a key-value cache.
//!   Concurrent adds on the same key may overwrite each other.
//! - [`TableStorage`] uses atomic SQL increments and never loses one.

pub mod cache;
pub mod record;
pub mod table;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

pub use self::cache::CacheStorage;
pub use self::record::{
    AggregateRecord, DerivedStats, Field, FieldValue, Measurement, OrderBy, ProfileEntry,
};
pub use self::table::TableStorage;

use crate::cache::KeyValueCache;
use crate::config::TableConfig;
use crate::error::{ConfigError, StorageError};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Record one measurement, creating the row for its key on first sight.
    async fn add(&self, measurement: &Measurement) -> Result<(), StorageError>;

    /// Snapshot of every row with derived values filled in.
    /// An empty `ordering` leaves the order unspecified.
    async fn fetch_all(&self, ordering: &[OrderBy]) -> Result<Vec<ProfileEntry>, StorageError>;

    /// Drop every row.
    async fn reset(&self) -> Result<(), StorageError>;
}

// ─── Registry ────────────────────────────────────────────────────

/// Configured backend, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Cache,
    Table,
}

impl StorageKind {
    const REGISTRY: [(&'static str, StorageKind); 2] =
        [("cache", StorageKind::Cache), ("table", StorageKind::Table)];

    pub fn name(self) -> &'static str {
        match self {
            StorageKind::Cache => "cache",
            StorageKind::Table => "table",
        }
    }
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::REGISTRY
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ConfigError::UnknownStorage(s.to_owned()))
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything needed to build the configured backend on first use.
pub struct StorageFactory {
    kind: StorageKind,
    cache: Arc<dyn KeyValueCache>,
    table: TableConfig,
}

impl StorageFactory {
    pub fn new(kind: StorageKind, cache: Arc<dyn KeyValueCache>, table: TableConfig) -> Self {
        Self { kind, cache, table }
    }

    pub async fn build(&self) -> Result<Arc<dyn Storage>, StorageError> {
        tracing::info!(backend = %self.kind, "initialising profiler storage");
        let storage: Arc<dyn Storage> = match self.kind {
            StorageKind::Cache => Arc::new(CacheStorage::new(self.cache.clone())),
            StorageKind::Table => Arc::new(TableStorage::connect(&self.table).await?),
        };
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_backends() {
        assert_eq!("cache".parse::<StorageKind>().unwrap(), StorageKind::Cache);
        assert_eq!("table".parse::<StorageKind>().unwrap(), StorageKind::Table);
    }

    #[test]
    fn unknown_backend_is_an_error() {
        assert!(matches!(
            "memcached".parse::<StorageKind>(),
            Err(ConfigError::UnknownStorage(name)) if name == "memcached"
        ));
    }
}
