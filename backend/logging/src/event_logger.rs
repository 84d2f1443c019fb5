//! Pipeline Event Logger
//!
//! One structured event per stage transition, emitted under the
//! `pipeline_events` target so it can be routed to the NDJSON file.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Encode,
    Ocr,
    Structure,
    Persist,
    Chat,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    StageCompleted {
        stage: Stage,
        latency_ms: u64,
    },
    /// An optional stage failed and the request carried on without it.
    StageDegraded {
        stage: Stage,
        kind: String,
        error_msg: String,
    },
    RunFailed {
        stage: Stage,
        kind: String,
        error_msg: String,
    },
    ChatStreamClosed {
        chunks: usize,
        failed: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct PipelineEventEntry {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: PipelineEvent,
}

pub struct PipelineEventLogger;

impl PipelineEventLogger {
    /// Redact free text in the event and hand it to the tracing system.
    pub fn log_event(request_id: &str, event: PipelineEvent) -> PipelineEventEntry {
        let event = match event {
            PipelineEvent::StageDegraded { stage, kind, error_msg } => PipelineEvent::StageDegraded {
                stage,
                kind,
                error_msg: redact_sensitive_data(&error_msg),
            },
            PipelineEvent::RunFailed { stage, kind, error_msg } => PipelineEvent::RunFailed {
                stage,
                kind,
                error_msg: redact_sensitive_data(&error_msg),
            },
            other => other,
        };

        let entry = PipelineEventEntry {
            request_id: request_id.into(),
            timestamp: Utc::now(),
            event,
        };

        info!(
            target: "pipeline_events",
            event = %serde_json::to_string(&entry).unwrap_or_default(),
            "Pipeline event"
        );
        entry
    }
}
