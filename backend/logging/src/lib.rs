//! Telemetry and structured logging for the CrowdHealth backend.
//!
//! Handles log redaction, console and rolling NDJSON output, and pipeline stage events.

pub mod event_logger;
pub mod logger;
pub mod redact;
#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use event_logger::{PipelineEvent, PipelineEventEntry, PipelineEventLogger, Stage};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
