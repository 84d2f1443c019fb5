//! Config validation: collects every problem in one pass.

use crate::schema::{CrowdHealthConfig, DatabaseBackend};
use thiserror::Error;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Log every finding, then fail if any of them is an error.
    pub fn ensure_valid(&self) -> anyhow::Result<()> {
        for warning in &self.warnings {
            tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
        }
        for error in &self.errors {
            tracing::error!(path = %error.path, message = %error.message, "Config error");
        }
        match self.errors.first() {
            Some(first) => anyhow::bail!("Invalid configuration ({} error(s)): {first}", self.errors.len()),
            None => Ok(()),
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).unwrap_or_default().is_empty()
}

/// Validate a config that has already had defaults applied.
pub fn validate(config: &CrowdHealthConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_gateway(config, &mut report);
    validate_inference(config, &mut report);
    validate_database(config, &mut report);
    report
}

fn validate_gateway(config: &CrowdHealthConfig, report: &mut ValidationReport) {
    let gateway = config.gateway();
    if gateway.port == Some(0) {
        report.error("gateway.port", "port must be > 0");
    }
    if gateway.request_timeout_secs == Some(0) {
        report.error("gateway.requestTimeoutSecs", "requestTimeoutSecs must be > 0");
    }
}

/// A missing token is only a warning: the server still starts and each
/// inference call fails with a configuration error.
fn validate_inference(config: &CrowdHealthConfig, report: &mut ValidationReport) {
    let inference = config.inference();
    if is_blank(inference.api_token.as_deref()) {
        report.warn(
            "inference.apiToken",
            "REPLICATE_API_TOKEN is not configured; OCR and language-model calls will fail",
        );
    }
    if inference.poll_interval_ms == Some(0) {
        report.error("inference.pollIntervalMs", "pollIntervalMs must be > 0");
    }
}

fn validate_database(config: &CrowdHealthConfig, report: &mut ValidationReport) {
    let database = config.database();
    match database.backend.unwrap_or_default() {
        DatabaseBackend::Postgrest => {
            if is_blank(database.url.as_deref()) {
                report.error("database.url", "Database URL is required (SUPABASE_URL)");
            }
            if is_blank(database.key.as_deref()) {
                report.error(
                    "database.key",
                    "Database key is required (SUPABASE_SERVICE_ROLE_KEY or NEXT_PUBLIC_SUPABASE_ANON_KEY)",
                );
            }
        }
        DatabaseBackend::Sqlite => {
            if is_blank(database.sqlite_path.as_deref()) {
                report.error("database.sqlitePath", "sqlitePath is required for the sqlite backend");
            }
        }
        DatabaseBackend::Memory => {
            report.warn("database.backend", "memory backend keeps nothing across restarts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::apply_all_defaults;
    use crate::schema::{DatabaseConfig, InferenceConfig};

    fn with_database(database: DatabaseConfig) -> CrowdHealthConfig {
        let mut cfg = CrowdHealthConfig::default();
        cfg.database = Some(database);
        cfg.inference = Some(InferenceConfig {
            api_token: Some("r8_token".into()),
            ..Default::default()
        });
        apply_all_defaults(cfg)
    }

    #[test]
    fn postgrest_without_key_is_an_error() {
        let report = validate(&with_database(DatabaseConfig {
            url: Some("https://abc.supabase.co".into()),
            ..Default::default()
        }));
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].path, "database.key");
    }

    #[test]
    fn ensure_valid_names_the_first_error() {
        let report = validate(&with_database(DatabaseConfig {
            url: Some("https://abc.supabase.co".into()),
            ..Default::default()
        }));
        let err = report.ensure_valid().unwrap_err().to_string();
        assert!(err.contains("database.key"), "{err}");
    }

    #[test]
    fn complete_postgrest_config_is_valid() {
        let report = validate(&with_database(DatabaseConfig {
            url: Some("https://abc.supabase.co".into()),
            key: Some("service".into()),
            ..Default::default()
        }));
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn sqlite_needs_a_path() {
        let report = validate(&with_database(DatabaseConfig {
            backend: Some(DatabaseBackend::Sqlite),
            ..Default::default()
        }));
        assert_eq!(report.errors[0].path, "database.sqlitePath");
    }

    #[test]
    fn missing_token_is_only_a_warning() {
        let mut cfg = with_database(DatabaseConfig {
            backend: Some(DatabaseBackend::Memory),
            ..Default::default()
        });
        cfg.inference = None;
        let report = validate(&apply_all_defaults(cfg));
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.path == "inference.apiToken"));
    }

    #[test]
    fn zero_timeout_is_an_error() {
        let mut cfg = with_database(DatabaseConfig {
            backend: Some(DatabaseBackend::Memory),
            ..Default::default()
        });
        if let Some(gateway) = cfg.gateway.as_mut() {
            gateway.request_timeout_secs = Some(0);
        }
        let report = validate(&cfg);
        assert_eq!(report.errors[0].path, "gateway.requestTimeoutSecs");
    }
}
