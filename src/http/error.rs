use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{ConfigError, Error};

// ─── Unified error type ──────────────────────────────────────────

/// Failures of the admin endpoints. Profiled requests never see these;
/// measurement errors are swallowed by the middleware.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Storage(String),
    Internal(String),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        match e {
            Error::Storage(e) => Self::Storage(e.to_string()),
            Error::Config(e) => Self::Internal(e.to_string()),
            Error::Export(e) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Storage(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("storage: {msg}"))
            }
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        tracing::warn!(status = status.as_u16(), error = %message, "admin request failed");

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
