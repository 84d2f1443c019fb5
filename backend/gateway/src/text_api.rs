//! Text-only language-model endpoints: bill structuring and note clean-up.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureRequest {
    #[serde(default, alias = "ocr_text")]
    pub ocr_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StructureResponse {
    pub structured: Value,
}

/// `POST /api/structure-bill`
pub async fn structure_bill(
    State(state): State<GatewayState>,
    payload: Result<Json<StructureRequest>, JsonRejection>,
) -> Result<Json<StructureResponse>, ApiError> {
    let Json(request) = payload?;
    let bill = state
        .structurer
        .structure(request.ocr_text.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(StructureResponse { structured: bill.raw }))
}

#[derive(Debug, Deserialize)]
pub struct CleanNoteRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CleanNoteResponse {
    pub cleaned: String,
}

/// `POST /api/clean-note`
pub async fn clean_note(
    State(state): State<GatewayState>,
    payload: Result<Json<CleanNoteRequest>, JsonRejection>,
) -> Result<Json<CleanNoteResponse>, ApiError> {
    let Json(request) = payload?;
    let cleaned = state
        .cleaner
        .clean(request.text.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(CleanNoteResponse { cleaned }))
}
