//! Bill pipeline: image in, OCR text out, enriched when possible.
//!
//! `Received -> Encoded -> OCR'd -> [Structured] -> [Persisted] -> Responded`.
//! Validation and OCR are mandatory and end the run on failure. Structuring
//! and persistence are best-effort: their failures become warnings on the
//! response and the OCR text is always returned.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crowdhealth_core::{CrowdError, InferenceGateway, Result, SavedBill};
use crowdhealth_store::{BillStore, PersistenceStage};
use crowdhealth_understanding::{decode_data_url, resolve_task, BillStructurer, OcrService};
use logging::{redact_sensitive_data, PipelineEvent, PipelineEventLogger, Stage};

fn default_true() -> bool {
    true
}

/// An OCR request. Accepts both camelCase and snake_case task parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInput {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, alias = "task_type")]
    pub task_type: Option<String>,
    #[serde(default, alias = "resolution_size")]
    pub resolution_size: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_true")]
    pub structure: bool,
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl PipelineInput {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            structure: true,
            persist: true,
            ..Default::default()
        }
    }

    fn reason(&self) -> Option<String> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineMeta {
    pub reason: Option<String>,
}

/// An optional stage that failed without failing the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageWarning {
    pub stage: Stage,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub result: String,
    pub structured: Option<Value>,
    pub saved: Option<SavedBill>,
    pub meta: PipelineMeta,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<StageWarning>,
}

pub struct BillPipeline {
    ocr: OcrService,
    structurer: BillStructurer,
    persistence: PersistenceStage,
}

impl BillPipeline {
    pub fn new(gateway: Arc<dyn InferenceGateway>, store: Arc<dyn BillStore>) -> Self {
        Self {
            ocr: OcrService::new(gateway.clone()),
            structurer: BillStructurer::new(gateway),
            persistence: PersistenceStage::new(store),
        }
    }

    #[instrument(skip_all, fields(request_id = tracing::field::Empty))]
    pub async fn run(&self, input: PipelineInput) -> Result<PipelineOutput> {
        let request_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());
        let reason = input.reason();

        // Received
        let Some(image) = input.image.as_deref().filter(|i| !i.trim().is_empty()) else {
            return Err(fail(&request_id, Stage::Encode, CrowdError::validation("Image is required")));
        };

        // Encoded
        let start = Instant::now();
        let decoded = decode_data_url(image).map_err(|e| fail(&request_id, Stage::Encode, e))?;
        completed(&request_id, Stage::Encode, start);

        // OCR'd
        let start = Instant::now();
        let task = resolve_task(input.task_type.as_deref(), input.resolution_size.as_deref());
        let text = self
            .ocr
            .extract_text(&decoded, &task)
            .await
            .map_err(|e| fail(&request_id, Stage::Ocr, e))?;
        completed(&request_id, Stage::Ocr, start);

        let mut output = PipelineOutput {
            result: text,
            structured: None,
            saved: None,
            meta: PipelineMeta { reason },
            warnings: Vec::new(),
        };
        if !input.structure {
            return Ok(output);
        }

        // Structured
        let start = Instant::now();
        let structured = match self.structurer.structure(&output.result).await {
            Ok(bill) => {
                completed(&request_id, Stage::Structure, start);
                bill
            }
            Err(e) => {
                output.warnings.push(degraded(&request_id, Stage::Structure, e));
                return Ok(output);
            }
        };
        output.structured = Some(structured.raw.clone());
        if !input.persist {
            return Ok(output);
        }

        // Persisted
        let start = Instant::now();
        match self
            .persistence
            .save(&output.result, &structured, output.meta.reason.as_deref())
            .await
        {
            Ok(saved) => {
                completed(&request_id, Stage::Persist, start);
                output.saved = Some(saved);
            }
            Err(e) => output.warnings.push(degraded(&request_id, Stage::Persist, e)),
        }

        info!(
            chars = output.result.len(),
            structured = output.structured.is_some(),
            saved = output.saved.is_some(),
            "Pipeline finished"
        );
        Ok(output)
    }
}

fn completed(request_id: &str, stage: Stage, start: Instant) {
    PipelineEventLogger::log_event(
        request_id,
        PipelineEvent::StageCompleted {
            stage,
            latency_ms: start.elapsed().as_millis() as u64,
        },
    );
}

fn degraded(request_id: &str, stage: Stage, err: CrowdError) -> StageWarning {
    warn!(?stage, kind = err.kind(), error = %redact_sensitive_data(&err.to_string()), "Optional stage failed; continuing");
    PipelineEventLogger::log_event(
        request_id,
        PipelineEvent::StageDegraded {
            stage,
            kind: err.kind().to_string(),
            error_msg: err.to_string(),
        },
    );
    StageWarning {
        stage,
        kind: err.kind().to_string(),
        message: err.to_string(),
    }
}

fn fail(request_id: &str, stage: Stage, err: CrowdError) -> CrowdError {
    PipelineEventLogger::log_event(
        request_id,
        PipelineEvent::RunFailed {
            stage,
            kind: err.kind().to_string(),
            error_msg: err.to_string(),
        },
    );
    err
}
