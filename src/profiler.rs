use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::cache::{self, KeyValueCache};
use crate::config::ProfilerConfig;
use crate::error::{ConfigError, Error, StorageError};
use crate::export::{self, ReportColumn};
use crate::storage::{Measurement, OrderBy, ProfileEntry, Storage, StorageFactory};

/// Shared-cache key holding the on/off switch.
pub const STATE_KEY: &str = "speedinfo.profiler.is_on";

/// Single entry point for request-handling and reporting code.
///
/// The on/off switch lives in the shared cache so every process sees the
/// same value; `is_on` keeps a local copy to fall back on when the cache is
/// unreachable. The storage backend is built on first use and reused for
/// the life of the process.
pub struct Profiler {
    state: Arc<dyn KeyValueCache>,
    is_on: AtomicBool,
    storage: OnceCell<Arc<dyn Storage>>,
    factory: Option<StorageFactory>,
    columns: Vec<ReportColumn>,
}

impl Profiler {
    /// Validate `config`, connect the shared cache and read the current switch.
    /// Configuration errors are returned here rather than on the first request.
    pub async fn from_config(config: &ProfilerConfig) -> Result<Self, Error> {
        let kind = config.storage_kind()?;
        let columns = config.report_columns()?;
        let cache = cache::connect(&config.cache).await?;

        let profiler = Self {
            state: cache.clone(),
            is_on: AtomicBool::new(false),
            storage: OnceCell::new(),
            factory: Some(StorageFactory::new(kind, cache, config.table.clone())),
            columns,
        };

        let on = profiler.is_on().await;
        info!(backend = %kind, is_on = on, "profiler ready");
        Ok(profiler)
    }

    /// Facade over an already-built backend.
    pub fn with_storage(
        state: Arc<dyn KeyValueCache>,
        storage: Arc<dyn Storage>,
        columns: Vec<ReportColumn>,
    ) -> Self {
        Self {
            state,
            is_on: AtomicBool::new(false),
            storage: OnceCell::from(storage),
            factory: None,
            columns,
        }
    }

    async fn storage(&self) -> Result<&Arc<dyn Storage>, Error> {
        self.storage
            .get_or_try_init(|| async {
                let factory = self.factory.as_ref().ok_or(ConfigError::MissingStorage)?;
                Ok::<_, Error>(factory.build().await?)
            })
            .await
    }

    // ── Switch ──────────────────────────────────────────────────

    async fn read_state(&self) -> Result<bool, StorageError> {
        match self.state.get(STATE_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(false),
        }
    }

    /// Current switch value as seen by every process.
    pub async fn is_on(&self) -> bool {
        match self.read_state().await {
            Ok(on) => {
                self.is_on.store(on, Ordering::Relaxed);
                on
            }
            Err(e) => {
                warn!(error = %e, "profiler state unreadable, using last known value");
                self.is_on.load(Ordering::Relaxed)
            }
        }
    }

    pub async fn set_on(&self, on: bool) -> Result<(), Error> {
        self.state.set(STATE_KEY, if on { "true" } else { "false" }).await?;
        self.is_on.store(on, Ordering::Relaxed);
        info!(is_on = on, "profiler switched");
        Ok(())
    }

    /// Flip the switch and return the new value.
    pub async fn switch(&self) -> Result<bool, Error> {
        let next = !self.read_state().await?;
        self.set_on(next).await?;
        Ok(next)
    }

    // ── Storage pass-throughs ───────────────────────────────────

    pub async fn add(&self, measurement: &Measurement) -> Result<(), Error> {
        self.storage().await?.add(measurement).await?;
        Ok(())
    }

    /// Like [`Profiler::add`], but failures are logged and dropped so the
    /// profiled request is never affected.
    pub async fn measure(&self, measurement: &Measurement) {
        if let Err(e) = self.add(measurement).await {
            warn!(
                endpoint = %measurement.endpoint_name,
                method = %measurement.method,
                error = %e,
                "dropping measurement"
            );
        }
    }

    pub async fn fetch_all(&self, ordering: &[OrderBy]) -> Result<Vec<ProfileEntry>, Error> {
        Ok(self.storage().await?.fetch_all(ordering).await?)
    }

    pub async fn reset(&self) -> Result<(), Error> {
        self.storage().await?.reset().await?;
        info!("profiler data reset");
        Ok(())
    }

    // ── Reporting ───────────────────────────────────────────────

    /// CSV snapshot using the configured report columns.
    pub async fn export(&self, ordering: &[OrderBy]) -> Result<String, Error> {
        let entries = self.fetch_all(ordering).await?;
        Ok(export::write_csv(&entries, &self.columns)?)
    }
}
