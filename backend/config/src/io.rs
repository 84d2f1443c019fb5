//! Config file location and loading.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolve the config directory.
/// Priority: `CROWDHEALTH_CONFIG_DIR` env > `~/.crowdhealth/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CROWDHEALTH_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".crowdhealth"))
        .unwrap_or_else(|| PathBuf::from(".crowdhealth"))
}

/// Resolve the config file: `CROWDHEALTH_CONFIG` if set, else `config.yaml` in `config_dir`.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    match std::env::var("CROWDHEALTH_CONFIG") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => config_dir.join(CONFIG_FILE_NAME),
    }
}

/// Read the config file as an untyped tree so `${VAR}` substitution can run
/// before typed parsing. A missing or empty file yields an empty object.
pub async fn load_raw_config(path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty_object() {
        let value = load_raw_config(Path::new("/nonexistent/crowdhealth/config.yaml"))
            .await
            .unwrap();
        assert_eq!(value, Value::Object(Default::default()));
    }

    #[tokio::test]
    async fn reads_yaml_file() {
        let path = std::env::temp_dir().join(format!("crowdhealth-config-{}.yaml", std::process::id()));
        tokio::fs::write(&path, "gateway:\n  port: 8080\n").await.unwrap();
        let value = load_raw_config(&path).await.unwrap();
        assert_eq!(value["gateway"]["port"], 8080);
        let _ = tokio::fs::remove_file(&path).await;
    }
}
