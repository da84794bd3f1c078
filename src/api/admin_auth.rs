//! Admin bearer-token auth, adapted from the teacher's
//! `auth::middleware::auth_middleware`: same shape (pull token from the
//! header, reject with a typed error before the handler runs), but
//! checked against one static configured token instead of a signed JWT,
//! since per-user login/session issuance is out of scope here (spec §9:
//! auth token verification is an external collaborator's concern).

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::api::AppState;

#[derive(Debug)]
pub enum AdminAuthError {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminAuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing bearer token"),
            AdminAuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid bearer token"),
        };
        (status, axum::Json(json!({"error": message}))).into_response()
    }
}

pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AdminAuthError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AdminAuthError::MissingToken)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AdminAuthError::MissingToken)?;

    if token != state.config.admin_bearer_token {
        return Err(AdminAuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}
