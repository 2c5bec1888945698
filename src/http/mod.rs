//! Axum integration: the profiling middleware and the admin endpoints.

pub mod admin;
mod error;
pub mod middleware;
pub mod server;

pub use error::AppError;
pub use middleware::{profiling_middleware, CacheHit, Principal, QueryTracker};
pub use server::{admin_router, create_router, profiled};
