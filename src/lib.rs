//! Per-endpoint request profiling.
//!
//! Measurements of finished requests are folded into one running-total
//! record per (endpoint, HTTP method). Records live either in a shared
//! key-value cache or in a SQL table, and are read back with derived
//! ratios for reporting and CSV export.

use std::sync::Arc;

pub mod cache;
pub mod conditions;
pub mod config;
pub mod error;
pub mod export;
pub mod http;
pub mod load_generator;
pub mod profiler;
pub mod storage;

pub use error::Error;
pub use profiler::Profiler;

use conditions::ConditionPipeline;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Entry point for recording and reporting.
    pub profiler: Arc<Profiler>,

    /// Gates consulted by the middleware on every request.
    pub conditions: Arc<ConditionPipeline>,
}

impl AppState {
    pub fn new(profiler: Arc<Profiler>) -> Self {
        Self {
            profiler,
            conditions: Arc::new(ConditionPipeline::new()),
        }
    }

    pub fn with_conditions(mut self, conditions: ConditionPipeline) -> Self {
        self.conditions = Arc::new(conditions);
        self
    }
}
