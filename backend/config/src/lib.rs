//! `crowdhealth-config`: runtime configuration.
//!
//! Provides:
//! - Typed config schema (gateway, inference, database, logging)
//! - YAML loading with `${ENV_VAR}` substitution
//! - Environment overlay for the well-known deployment variables
//! - Defaults, validation, and redaction for safe logging

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{apply_env_overrides, resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_raw_config};
pub use redact::redact;
pub use schema::{
    CrowdHealthConfig, DatabaseBackend, DatabaseConfig, GatewayConfig, InferenceConfig, LoggingConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

/// Substitute, parse, overlay, default, and validate a raw config tree.
pub fn prepare(
    raw: &Value,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<(CrowdHealthConfig, ValidationReport)> {
    let value = resolve_env_vars_with(raw, lookup).context("Failed to resolve env vars in config")?;
    let config: CrowdHealthConfig =
        serde_json::from_value(value).context("Failed to deserialize config")?;
    let config = apply_all_defaults(apply_env_overrides(config, lookup));
    let report = validate(&config);
    Ok((config, report))
}

/// Load the config file and overlay the process environment.
///
/// The report is returned unchecked so callers can set up logging first.
pub async fn load(path: &Path) -> Result<(CrowdHealthConfig, ValidationReport)> {
    let raw = load_raw_config(path).await?;
    prepare(&raw, &|name| std::env::var(name).ok())
}
