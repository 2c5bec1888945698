use thiserror::Error;

/// Failures raised by a storage backend or the cache it sits on.
///
/// Conflicts on row creation never show up here; the table store
/// recovers from those locally.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache backend: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("database backend: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt cache entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),
}

/// Startup-time configuration problems. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no storage backend configured (set `storage` to \"cache\" or \"table\")")]
    MissingStorage,

    #[error("unknown storage backend \"{0}\"")]
    UnknownStorage(String),

    #[error("unknown report attribute \"{0}\"")]
    UnknownAttribute(String),

    #[error("invalid format pattern \"{pattern}\": {reason}")]
    InvalidFormat { pattern: String, reason: String },

    #[error("unknown ordering field \"{0}\"")]
    UnknownOrdering(String),

    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv flush: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv output is not utf-8")]
    Encoding,
}

/// Errors surfaced by the [`crate::Profiler`] facade.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
