//! `POST /api/ocr`

use axum::{extract::rejection::JsonRejection, extract::State, Json};

use crowdhealth_pipeline::{PipelineInput, PipelineOutput};

use crate::error::ApiError;
use crate::server::GatewayState;

pub async fn run_ocr(
    State(state): State<GatewayState>,
    payload: Result<Json<PipelineInput>, JsonRejection>,
) -> Result<Json<PipelineOutput>, ApiError> {
    let Json(input) = payload?;
    let output = state.pipeline.run(input).await?;
    Ok(Json(output))
}
