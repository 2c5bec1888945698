use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use endpoint_profiler::config::ProfilerConfig;
use endpoint_profiler::{http, AppState, Profiler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── 1. Load configuration ────────────────────────────────────
    let path = std::env::var("PROFILER_CONFIG").unwrap_or_else(|_| "profiler.toml".into());
    let config = ProfilerConfig::load(Some(&path))
        .with_context(|| format!("loading configuration from {path}"))?;
    config.validate().context("invalid profiler configuration")?;

    // ── 2. Build the profiler ────────────────────────────────────
    let profiler = Profiler::from_config(&config)
        .await
        .context("starting profiler")?;

    // ── 3. Build shared state and router ─────────────────────────
    let state = Arc::new(AppState::new(Arc::new(profiler)));
    let app = http::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(%addr, "admin endpoints at /admin/profiler");

    axum::serve(listener, app).await.context("server exited with error")?;
    Ok(())
}
