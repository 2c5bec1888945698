use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::load_generator::{self, LoadPlan, LoadReport};
use crate::storage::{OrderBy, ProfileEntry};
use crate::AppState;

use super::AppError;

/// Report ordering when the caller gives none.
const DEFAULT_ORDERING: &str = "-total_time";

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    /// Comma-separated field names, `-` prefix for descending.
    pub ordering: Option<String>,
}

impl ReportQuery {
    fn ordering(&self) -> Result<Vec<OrderBy>, AppError> {
        let raw = self.ordering.as_deref().unwrap_or(DEFAULT_ORDERING);
        Ok(OrderBy::parse_list(raw)?)
    }
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub is_on: bool,
    pub records: Vec<ProfileEntry>,
}

#[derive(Debug, Serialize)]
pub struct SwitchStatus {
    pub is_on: bool,
}

// ─── GET /admin/profiler ─────────────────────────────────────────

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Report>, AppError> {
    let ordering = query.ordering()?;
    let records = state.profiler.fetch_all(&ordering).await?;

    Ok(Json(Report {
        is_on: state.profiler.is_on().await,
        records,
    }))
}

// ─── POST /admin/profiler/switch ─────────────────────────────────

pub async fn switch(State(state): State<Arc<AppState>>) -> Result<Json<SwitchStatus>, AppError> {
    let is_on = state.profiler.switch().await?;
    Ok(Json(SwitchStatus { is_on }))
}

// ─── POST /admin/profiler/reset ──────────────────────────────────

pub async fn reset(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.profiler.reset().await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── GET /admin/profiler/export ──────────────────────────────────

pub async fn export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ordering = query.ordering()?;
    let body = state.profiler.export(&ordering).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=profiler.csv"),
        ],
        body,
    ))
}

// ─── POST /admin/profiler/load ───────────────────────────────────

/// Feed synthetic measurements straight into storage and report what was sent.
pub async fn run_load(
    State(state): State<Arc<AppState>>,
    Json(plan): Json<LoadPlan>,
) -> Result<Json<LoadReport>, AppError> {
    let report = load_generator::run(state.profiler.clone(), plan)
        .await
        .map_err(AppError::BadRequest)?;
    Ok(Json(report))
}
