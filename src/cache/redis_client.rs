use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::KeyValueCache;
use crate::error::StorageError;

/// Redis-backed cache shared by every profiler process.
///
/// `ConnectionManager` is cheaply cloneable and reconnects on failure;
/// each call clones it and issues a single command. `key_prefix` namespaces
/// every key so several deployments can share one Redis.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    key_prefix: String,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("conn", &"<ConnectionManager>")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisCache {
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key_prefix: key_prefix.to_owned(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(self.key(key)).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.key(key), value).await?;
        Ok(())
    }

    async fn add(&self, key: &str, value: &str) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        Ok(conn.set_nx(self.key(key), value).await?)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        // DEL with no arguments is a protocol error
        if keys.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys).await?;
        Ok(())
    }
}
