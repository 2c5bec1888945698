use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::{admin, middleware::profiling_middleware};
use crate::AppState;

/// Profiler admin endpoints, meant to be nested under `/admin/profiler`.
pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(admin::get_report))
        .route("/switch", post(admin::switch))
        .route("/reset", post(admin::reset))
        .route("/export", get(admin::export))
        .route("/load", post(admin::run_load))
}

/// Wrap a host router so every routed request is measured.
///
/// The layer is applied before `with_state`, so `MatchedPath` is available
/// and the endpoint name is the route pattern rather than the raw path.
pub fn profiled(routes: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    routes
        .layer(axum_mw::from_fn_with_state(state.clone(), profiling_middleware))
        .with_state(state)
}

/// Builds the standalone `Router`: health check plus the admin endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        // ── Liveness ────────────────────────────────────────────
        .route("/health", get(health))
        // ── Profiler admin ──────────────────────────────────────
        .nest("/admin/profiler", admin_router());

    profiled(routes, state)
        // ── Global middleware ───────────────────────────────────
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
