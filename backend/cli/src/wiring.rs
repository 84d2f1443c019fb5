//! Builds the runtime components from a prepared config.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crowdhealth_config::{DatabaseBackend, DatabaseConfig, InferenceConfig};
use crowdhealth_inference::ReplicateGateway;
use crowdhealth_store::{BillStore, InMemoryBillStore, PostgrestStore, SqliteBillStore};

/// `budget` is the per-request timeout; polling stops once it is spent.
pub fn build_inference(config: &InferenceConfig, budget: Duration) -> ReplicateGateway {
    let mut gateway = ReplicateGateway::new(config.api_token.clone());
    if let Some(url) = &config.base_url {
        gateway = gateway.with_base_url(url.clone());
    }
    if let (Some(ocr), Some(llm)) = (&config.ocr_model, &config.language_model) {
        gateway = gateway.with_models(ocr.clone(), llm.clone());
    }
    if let Some(ms) = config.poll_interval_ms.filter(|ms| *ms > 0) {
        gateway = gateway
            .with_poll_interval(Duration::from_millis(ms))
            .with_max_polls(max_polls(budget, ms));
    }
    if let Some(secs) = config.prefer_wait_secs {
        gateway = gateway.with_prefer_wait(u32::try_from(secs).unwrap_or(u32::MAX));
    }
    if !gateway.is_configured() {
        warn!("No inference token configured; OCR and chat requests will fail");
    }
    gateway
}

fn max_polls(budget: Duration, interval_ms: u64) -> u32 {
    let polls = (budget.as_millis() / u128::from(interval_ms)).max(1);
    u32::try_from(polls).unwrap_or(u32::MAX)
}

pub fn build_store(config: &DatabaseConfig) -> Result<Arc<dyn BillStore>> {
    let backend = config.backend.unwrap_or_default();
    info!(backend = ?backend, "Opening bill store");
    let store: Arc<dyn BillStore> = match backend {
        DatabaseBackend::Postgrest => Arc::new(PostgrestStore::new(
            config.url.as_deref().unwrap_or_default(),
            config.key.as_deref().unwrap_or_default(),
        )?),
        DatabaseBackend::Sqlite => {
            let path = config
                .sqlite_path
                .as_deref()
                .context("database.sqlitePath is required for the sqlite backend")?;
            Arc::new(SqliteBillStore::open(path)?)
        }
        DatabaseBackend::Memory => Arc::new(InMemoryBillStore::new()),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_each_backend() {
        let memory = build_store(&DatabaseConfig {
            backend: Some(DatabaseBackend::Memory),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(memory.name(), "memory");

        let sqlite = build_store(&DatabaseConfig {
            backend: Some(DatabaseBackend::Sqlite),
            sqlite_path: Some(":memory:".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(sqlite.name(), "sqlite");

        let hosted = build_store(&DatabaseConfig {
            url: Some("https://abc.supabase.co".into()),
            key: Some("service".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(hosted.name(), "postgrest");
    }

    #[test]
    fn incomplete_backends_fail() {
        assert!(build_store(&DatabaseConfig::default()).is_err());
        assert!(build_store(&DatabaseConfig {
            backend: Some(DatabaseBackend::Sqlite),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn token_decides_configuration() {
        let budget = Duration::from_secs(300);
        assert!(!build_inference(&InferenceConfig::default(), budget).is_configured());
        let configured = build_inference(
            &InferenceConfig {
                api_token: Some("r8_token".into()),
                ..Default::default()
            },
            budget,
        );
        assert!(configured.is_configured());
    }

    #[test]
    fn poll_cap_follows_the_request_budget() {
        assert_eq!(max_polls(Duration::from_secs(300), 1000), 300);
        assert_eq!(max_polls(Duration::from_secs(300), 500), 600);
        assert_eq!(max_polls(Duration::from_millis(100), 1000), 1);
    }
}
