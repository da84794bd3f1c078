//! Domain error kinds shared by every store and pipeline (spec §7).
//!
//! `consume_delivery` / `place_exit_order` returning `false` are not errors —
//! callers encode that outcome in the domain event themselves. Only genuine
//! failures flow through `AppError`.

use axum::{http::StatusCode, response::IntoResponse, response::Json, response::Response};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    /// Optimistic soft-delete affected 0 rows: another writer won the race.
    ConflictVersion(String),
    /// An atomic transition precondition failed (non-fatal, caller decides).
    ConflictState(String),
    ValidationFailed(Vec<ValidationError>),
    AdapterUnavailable(String),
    AdapterRejected { code: String, message: String },
    Timeout,
    Cancelled,
    Internal(String),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationError {
    pub code: String,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(what) => write!(f, "not found: {what}"),
            AppError::ConflictVersion(what) => write!(f, "version conflict: {what}"),
            AppError::ConflictState(what) => write!(f, "state conflict: {what}"),
            AppError::ValidationFailed(errs) => write!(f, "validation failed: {} error(s)", errs.len()),
            AppError::AdapterUnavailable(what) => write!(f, "adapter unavailable: {what}"),
            AppError::AdapterRejected { code, message } => {
                write!(f, "adapter rejected [{code}]: {message}")
            }
            AppError::Timeout => write!(f, "timeout"),
            AppError::Cancelled => write!(f, "cancelled"),
            AppError::Internal(what) => write!(f, "internal error: {what}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound("row".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, json!({"error": format!("not found: {what}")})),
            AppError::ConflictVersion(what) => (
                StatusCode::CONFLICT,
                json!({"error": format!("version conflict: {what}")}),
            ),
            AppError::ConflictState(what) => (
                StatusCode::CONFLICT,
                json!({"error": format!("state conflict: {what}")}),
            ),
            AppError::ValidationFailed(errs) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"error": "validation failed", "validation_errors": errs}),
            ),
            AppError::AdapterUnavailable(what) => (
                StatusCode::BAD_GATEWAY,
                json!({"error": format!("broker adapter unavailable: {what}")}),
            ),
            AppError::AdapterRejected { code, message } => (
                StatusCode::BAD_GATEWAY,
                json!({"error": message, "error_code": code}),
            ),
            AppError::Timeout => (StatusCode::GATEWAY_TIMEOUT, json!({"error": "timeout"})),
            AppError::Cancelled => (StatusCode::BAD_REQUEST, json!({"error": "cancelled"})),
            AppError::Internal(what) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": format!("internal error: {what}")}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
