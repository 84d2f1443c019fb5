//! Environment handling for config values.
//!
//! Two passes: `${VAR_NAME}` references inside string leaves of the raw YAML
//! are substituted first, then well-known variables are overlaid onto the
//! typed config. `$${VAR}` escapes to a literal `${VAR}`.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::schema::{CrowdHealthConfig, DatabaseBackend};

/// `${VAR}` with an optional leading `$` marking an escape.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

/// Error returned for missing env vars.
#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, &|name| std::env::var(name).ok())
}

/// Substitute `${VAR}` references using `lookup`. Unset or empty vars are errors.
pub fn resolve_env_vars_with(value: &Value, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Value> {
    Ok(substitute(value, lookup, "")?)
}

fn substitute(
    value: &Value,
    lookup: &dyn Fn(&str) -> Option<String>,
    path: &str,
) -> std::result::Result<Value, MissingEnvVarError> {
    match value {
        Value::String(s) if s.contains("${") => substitute_string(s, lookup, path).map(Value::String),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| substitute(v, lookup, &format!("{path}[{i}]")))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let child = if path.is_empty() { k.clone() } else { format!("{path}.{k}") };
                out.insert(k.clone(), substitute(v, lookup, &child)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(
    s: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
    path: &str,
) -> std::result::Result<String, MissingEnvVarError> {
    let mut missing = None;
    let replaced = ENV_VAR_PATTERN.replace_all(s, |caps: &Captures| {
        let name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{name}}}");
        }
        match lookup(name).filter(|v| !v.is_empty()) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });
    match missing {
        Some(err) => Err(err),
        None => Ok(replaced.into_owned()),
    }
}

/// Overlay well-known environment variables onto the config.
///
/// Set, non-empty variables win over file values.
pub fn apply_env_overrides(mut config: CrowdHealthConfig, lookup: &dyn Fn(&str) -> Option<String>) -> CrowdHealthConfig {
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let first = |names: &[&str]| names.iter().find_map(|n| get(*n));

    let inference = config.inference.get_or_insert_with(Default::default);
    if let Some(token) = get("REPLICATE_API_TOKEN") {
        inference.api_token = Some(token);
    }

    let database = config.database.get_or_insert_with(Default::default);
    if let Some(url) = first(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]) {
        database.url = Some(url);
    }
    if let Some(key) = first(&["SUPABASE_SERVICE_ROLE_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]) {
        database.key = Some(key);
    }
    if let Some(backend) = get("CROWDHEALTH_DB_BACKEND") {
        match backend.parse::<DatabaseBackend>() {
            Ok(b) => database.backend = Some(b),
            Err(e) => tracing::warn!("Ignoring CROWDHEALTH_DB_BACKEND: {e}"),
        }
    }
    if let Some(path) = get("CROWDHEALTH_SQLITE_PATH") {
        database.sqlite_path = Some(path);
    }

    let gateway = config.gateway.get_or_insert_with(Default::default);
    if let Some(password) = get("UPLOAD_PASSWORD") {
        gateway.upload_password = Some(password);
    }
    if let Some(bind) = get("CROWDHEALTH_BIND") {
        gateway.bind = Some(bind);
    }
    if let Some(port) = get("CROWDHEALTH_PORT") {
        match port.parse() {
            Ok(p) => gateway.port = Some(p),
            Err(e) => tracing::warn!("Ignoring CROWDHEALTH_PORT={port}: {e}"),
        }
    }

    let logging = config.logging.get_or_insert_with(Default::default);
    if let Some(dir) = get("CROWDHEALTH_LOG_DIR") {
        logging.dir = Some(dir);
    }
    if let Some(level) = get("RUST_LOG") {
        logging.level = Some(level);
    }

    config
}
