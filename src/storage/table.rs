use std::fmt::{self, Debug, Formatter};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::debug;

use super::record::{AggregateRecord, DerivedStats, Measurement, OrderBy, ProfileEntry};
use super::Storage;
use crate::config::TableConfig;
use crate::error::StorageError;

/// Store backed by a SQL table with a unique `(endpoint_name, method)` key.
///
/// Counters are bumped with `col = col + ?`, so concurrent adds on the
/// same key are all applied. Integer counters saturate at `i64::MAX`. Derived values and ordering are computed in
/// SQL.
pub struct TableStorage {
    pool: SqlitePool,
}

impl Debug for TableStorage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableStorage")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

/// Raw row plus SQL-computed derived columns.
/// SQLite has no unsigned integers, hence the i64 counters.
#[derive(Debug, FromRow)]
struct ProfileRow {
    endpoint_name: String,
    method: String,
    anon_calls: i64,
    cache_hits: i64,
    query_total_time: f64,
    query_total_count: i64,
    total_calls: i64,
    total_time: f64,
    anon_ratio: f64,
    cache_hit_ratio: f64,
    query_count_per_call: i64,
    query_time_ratio: f64,
    time_per_call: f64,
}

impl From<ProfileRow> for ProfileEntry {
    fn from(row: ProfileRow) -> Self {
        ProfileEntry {
            record: AggregateRecord {
                endpoint_name: row.endpoint_name,
                method: row.method,
                anon_calls: row.anon_calls.max(0) as u64,
                cache_hits: row.cache_hits.max(0) as u64,
                query_total_time: row.query_total_time,
                query_total_count: row.query_total_count.max(0) as u64,
                total_calls: row.total_calls.max(0) as u64,
                total_time: row.total_time,
            },
            stats: DerivedStats {
                anon_ratio: row.anon_ratio,
                cache_hit_ratio: row.cache_hit_ratio,
                query_count_per_call: row.query_count_per_call.max(0) as u64,
                query_time_ratio: row.query_time_ratio,
                time_per_call: row.time_per_call,
            },
        }
    }
}

const SELECT_ENTRIES: &str = r#"
    SELECT
        endpoint_name,
        method,
        anon_calls,
        cache_hits,
        query_total_time,
        query_total_count,
        total_calls,
        total_time,
        CASE WHEN total_calls = 0 THEN 0.0
             ELSE 100.0 * anon_calls / total_calls END AS anon_ratio,
        CASE WHEN total_calls = 0 THEN 0.0
             ELSE 100.0 * cache_hits / total_calls END AS cache_hit_ratio,
        CASE WHEN total_calls = 0 THEN 0
             ELSE CAST(ROUND(CAST(query_total_count AS REAL) / total_calls) AS INTEGER)
             END AS query_count_per_call,
        CASE WHEN total_calls = 0 OR total_time = 0 THEN 0.0
             ELSE 100.0 * query_total_time / total_time END AS query_time_ratio,
        CASE WHEN total_calls = 0 THEN 0.0
             ELSE total_time / total_calls END AS time_per_call
    FROM speedinfo_profiler
"#;

impl TableStorage {
    /// Open (or create) the database and make sure the table exists.
    pub async fn connect(config: &TableConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let storage = Self::new(pool);
        storage.initialize_schema().await?;
        Ok(storage)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn initialize_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS speedinfo_profiler (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                endpoint_name TEXT NOT NULL,
                method TEXT NOT NULL,
                anon_calls INTEGER NOT NULL DEFAULT 0,
                cache_hits INTEGER NOT NULL DEFAULT 0,
                query_total_time REAL NOT NULL DEFAULT 0,
                query_total_count INTEGER NOT NULL DEFAULT 0,
                total_calls INTEGER NOT NULL DEFAULT 0,
                total_time REAL NOT NULL DEFAULT 0,
                UNIQUE (endpoint_name, method)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_id(&self, endpoint_name: &str, method: &str) -> Result<Option<i64>, StorageError> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM speedinfo_profiler WHERE endpoint_name = ? AND method = ?",
        )
        .bind(endpoint_name)
        .bind(method)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Row id for the key, inserting an empty row if needed.
    async fn get_or_create(&self, endpoint_name: &str, method: &str) -> Result<i64, StorageError> {
        if let Some(id) = self.find_id(endpoint_name, method).await? {
            return Ok(id);
        }

        let inserted = sqlx::query(
            "INSERT INTO speedinfo_profiler (endpoint_name, method) VALUES (?, ?)",
        )
        .bind(endpoint_name)
        .bind(method)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(done) => Ok(done.last_insert_rowid()),
            // Another worker created the row between our SELECT and INSERT
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!(endpoint = %endpoint_name, method = %method, "lost creation race, re-fetching");
                self.find_id(endpoint_name, method)
                    .await?
                    .ok_or(StorageError::Database(sqlx::Error::RowNotFound))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Storage for TableStorage {
    async fn add(&self, m: &Measurement) -> Result<(), StorageError> {
        m.validate()?;
        let id = self.get_or_create(&m.endpoint_name, &m.method).await?;

        sqlx::query(
            r#"
            UPDATE speedinfo_profiler SET
                anon_calls = MIN(anon_calls + ?, 9223372036854775807),
                cache_hits = MIN(cache_hits + ?, 9223372036854775807),
                query_total_time = query_total_time + ?,
                query_total_count = MIN(query_total_count + ?, 9223372036854775807),
                total_calls = MIN(total_calls + 1, 9223372036854775807),
                total_time = total_time + ?
            WHERE id = ?
            "#,
        )
        .bind(i64::from(m.is_anon_call))
        .bind(i64::from(m.is_cache_hit))
        .bind(m.query_time)
        .bind(i64::try_from(m.query_count).unwrap_or(i64::MAX))
        .bind(m.call_duration)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_all(&self, ordering: &[OrderBy]) -> Result<Vec<ProfileEntry>, StorageError> {
        let mut sql = String::from(SELECT_ENTRIES);
        if !ordering.is_empty() {
            // Column names come from the Field whitelist, never from input
            let keys: Vec<String> = ordering
                .iter()
                .map(|o| {
                    let dir = if o.descending { "DESC" } else { "ASC" };
                    format!("{} {dir}", o.field.name())
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        let rows: Vec<ProfileRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ProfileEntry::from).collect())
    }

    async fn reset(&self) -> Result<(), StorageError> {
        let done = sqlx::query("DELETE FROM speedinfo_profiler")
            .execute(&self.pool)
            .await?;
        debug!(rows = done.rows_affected(), "profiler table cleared");
        Ok(())
    }
}
