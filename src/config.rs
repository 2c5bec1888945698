use serde::Deserialize;

use crate::error::ConfigError;
use crate::export::ReportColumn;
use crate::storage::StorageKind;

/// Top-level settings, read from an optional TOML file and `PROFILER_*`
/// environment variables (nested keys use `__`, e.g. `PROFILER_CACHE__URL`).
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilerConfig {
    /// `"cache"` or `"table"`. Required.
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_report_columns")]
    pub report_columns: Vec<ColumnConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// `"memory"` or a `redis://` URL
    #[serde(default = "default_cache_url")]
    pub url: String,
    #[serde(default)]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_table_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// One export column as written in config: display name, format pattern,
/// and the record attribute it reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    pub format: String,
    pub attr: String,
}

impl ColumnConfig {
    pub fn new(name: &str, format: &str, attr: &str) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            attr: attr.into(),
        }
    }
}

fn default_cache_url() -> String {
    "memory".into()
}
fn default_table_url() -> String {
    "sqlite://speedinfo.db".into()
}
fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout() -> u64 {
    5
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}

pub fn default_report_columns() -> Vec<ColumnConfig> {
    vec![
        ColumnConfig::new("View name", "{}", "endpoint_name"),
        ColumnConfig::new("HTTP method", "{}", "method"),
        ColumnConfig::new("Anonymous calls", "{:.1}%", "anon_ratio"),
        ColumnConfig::new("Cache hits", "{:.1}%", "cache_hit_ratio"),
        ColumnConfig::new("SQL queries per call", "{}", "query_count_per_call"),
        ColumnConfig::new("SQL time", "{:.1}%", "query_time_ratio"),
        ColumnConfig::new("Total calls", "{}", "total_calls"),
        ColumnConfig::new("Time per call", "{:.8}", "time_per_call"),
        ColumnConfig::new("Total time", "{:.4}", "total_time"),
    ]
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            storage: None,
            cache: CacheConfig::default(),
            table: TableConfig::default(),
            server: ServerConfig::default(),
            report_columns: default_report_columns(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: default_cache_url(),
            key_prefix: String::new(),
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            url: default_table_url(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ProfilerConfig {
    /// Load from `path` (skipped if the file doesn't exist) plus environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Example: PROFILER_STORAGE=table PROFILER_TABLE__URL=sqlite://stats.db
        builder = builder.add_source(
            config::Environment::with_prefix("PROFILER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Resolve the storage backend name. Unknown or missing names are fatal.
    pub fn storage_kind(&self) -> Result<StorageKind, ConfigError> {
        match self.storage.as_deref() {
            None | Some("") => Err(ConfigError::MissingStorage),
            Some(name) => name.parse(),
        }
    }

    pub fn report_columns(&self) -> Result<Vec<ReportColumn>, ConfigError> {
        self.report_columns.iter().map(ReportColumn::parse).collect()
    }

    /// Startup checks: everything that would otherwise fail on first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage_kind()?;
        self.report_columns()?;
        Ok(())
    }

    pub fn with_storage(mut self, name: &str) -> Self {
        self.storage = Some(name.to_owned());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_storage_is_fatal() {
        let config = ProfilerConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingStorage)));
    }

    #[test]
    fn unknown_storage_is_fatal() {
        let config = ProfilerConfig::default().with_storage("mongo");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownStorage(name)) if name == "mongo"
        ));
    }

    #[test]
    fn bad_report_column_is_fatal() {
        let mut config = ProfilerConfig::default().with_storage("cache");
        config
            .report_columns
            .push(ColumnConfig::new("Oops", "{}", "no_such_attr"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn defaults_are_valid_once_storage_is_set() {
        let config = ProfilerConfig::default().with_storage("table");
        config.validate().unwrap();
        assert_eq!(config.cache.url, "memory");
        assert_eq!(config.server.port, 3000);
    }
}
