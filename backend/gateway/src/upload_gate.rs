//! Upload gate: a shared password that keeps casual spam off the upload form.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct GateRequest {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GateResponse {
    pub ok: bool,
}

/// `POST /api/upload-gate`. Open when no password is configured.
pub async fn check_upload_gate(
    State(state): State<GatewayState>,
    payload: Result<Json<GateRequest>, JsonRejection>,
) -> Result<Json<GateResponse>, ApiError> {
    let Json(request) = payload?;
    let Some(expected) = state.upload_password.as_deref() else {
        return Ok(Json(GateResponse { ok: true }));
    };
    if request.password.as_deref() == Some(expected) {
        Ok(Json(GateResponse { ok: true }))
    } else {
        warn!("Upload gate rejected a password");
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "Incorrect password"))
    }
}
