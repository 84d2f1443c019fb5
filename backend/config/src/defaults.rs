//! Config defaults: fills every unset field after loading.

use crate::schema::{
    CrowdHealthConfig, DatabaseBackend, DatabaseConfig, GatewayConfig, InferenceConfig, LoggingConfig,
};

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

/// Per-request wall-clock budget; slow OCR models need minutes.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_INFERENCE_BASE_URL: &str = "https://api.replicate.com/v1";
pub const DEFAULT_OCR_MODEL: &str =
    "lucataco/deepseek-ocr:cb3b474fbfc56b1664c8c7841550bccecbe7b74c30e45ce938ffca1180b4dff5";
pub const DEFAULT_LANGUAGE_MODEL: &str = "openai/gpt-5-nano";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_PREFER_WAIT_SECS: u64 = 60;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: CrowdHealthConfig) -> CrowdHealthConfig {
    let config = apply_gateway_defaults(config);
    let config = apply_inference_defaults(config);
    let config = apply_database_defaults(config);
    apply_logging_defaults(config)
}

fn apply_gateway_defaults(mut config: CrowdHealthConfig) -> CrowdHealthConfig {
    let gateway = config.gateway.get_or_insert_with(GatewayConfig::default);
    gateway.bind.get_or_insert_with(|| DEFAULT_BIND.to_string());
    gateway.port.get_or_insert(DEFAULT_PORT);
    gateway.request_timeout_secs.get_or_insert(DEFAULT_REQUEST_TIMEOUT_SECS);
    config
}

fn apply_inference_defaults(mut config: CrowdHealthConfig) -> CrowdHealthConfig {
    let inference = config.inference.get_or_insert_with(InferenceConfig::default);
    inference.base_url.get_or_insert_with(|| DEFAULT_INFERENCE_BASE_URL.to_string());
    inference.ocr_model.get_or_insert_with(|| DEFAULT_OCR_MODEL.to_string());
    inference.language_model.get_or_insert_with(|| DEFAULT_LANGUAGE_MODEL.to_string());
    inference.poll_interval_ms.get_or_insert(DEFAULT_POLL_INTERVAL_MS);
    inference.prefer_wait_secs.get_or_insert(DEFAULT_PREFER_WAIT_SECS);
    config
}

/// The hosted store is the default; sqlite and memory are opt-in.
fn apply_database_defaults(mut config: CrowdHealthConfig) -> CrowdHealthConfig {
    let database = config.database.get_or_insert_with(DatabaseConfig::default);
    database.backend.get_or_insert(DatabaseBackend::Postgrest);
    config
}

fn apply_logging_defaults(mut config: CrowdHealthConfig) -> CrowdHealthConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    config
}
