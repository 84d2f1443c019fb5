//! Hosted relational store reached over its PostgREST HTTP interface.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crowdhealth_core::{
    CampaignRecord, CrowdfundingCampaign, MedicalBill, NewCampaign, NewMedicalBill,
};

use crate::store::BillStore;

const BILLS_TABLE: &str = "medical_bills";
const CAMPAIGNS_TABLE: &str = "crowdfunding_campaigns";

/// Embedded select used for every campaign read.
pub const CAMPAIGN_SELECT: &str = "*,medical_bills(patient_name,patient_dob,provider_name,\
provider_address,service_date,total_amount,items,billing_address,account_number)";

pub struct PostgrestStore {
    client: Client,
    rest_url: String,
    key: String,
}

impl PostgrestStore {
    /// `url` is the project URL; the REST root is `{url}/rest/v1`.
    pub fn new(url: &str, key: &str) -> Result<Self> {
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            bail!("database URL is not configured");
        }
        if key.trim().is_empty() {
            bail!("database key is not configured");
        }
        Ok(Self {
            client: Client::new(),
            rest_url: format!("{url}/rest/v1"),
            key: key.trim().to_string(),
        })
    }

    fn table(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn insert_one<B, T>(&self, table: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .authorized(self.client.post(self.table(table)))
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .with_context(|| format!("{table} insert request failed"))?;
        let mut rows: Vec<T> = read_rows(table, response).await?;
        if rows.is_empty() {
            bail!("{table} insert returned no row");
        }
        Ok(rows.swap_remove(0))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let response = self
            .authorized(self.client.get(self.table(table)))
            .query(query)
            .send()
            .await
            .with_context(|| format!("{table} select request failed"))?;
        read_rows(table, response).await
    }
}

async fn read_rows<T: DeserializeOwned>(table: &str, response: Response) -> Result<Vec<T>> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        bail!("{table} request returned {status}: {}", error_message(&text));
    }
    let rows = response
        .json::<Vec<T>>()
        .await
        .with_context(|| format!("Failed to parse {table} rows"))?;
    Ok(rows)
}

/// PostgREST errors are JSON with a `message` field; fall back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl BillStore for PostgrestStore {
    fn name(&self) -> &str {
        "postgrest"
    }

    async fn insert_bill(&self, bill: NewMedicalBill) -> Result<MedicalBill> {
        let saved: MedicalBill = self.insert_one(BILLS_TABLE, &[&bill]).await?;
        debug!("Inserted medical bill {}", saved.id);
        Ok(saved)
    }

    async fn insert_campaign(&self, campaign: NewCampaign) -> Result<CrowdfundingCampaign> {
        let saved: CrowdfundingCampaign = self.insert_one(CAMPAIGNS_TABLE, &[&campaign]).await?;
        debug!("Inserted campaign {} for bill {}", saved.id, saved.medical_bill_id);
        Ok(saved)
    }

    async fn campaign_with_bill(&self, id: Uuid) -> Result<Option<CampaignRecord>> {
        let rows: Vec<CampaignRecord> = self
            .select(
                CAMPAIGNS_TABLE,
                &[
                    ("select", CAMPAIGN_SELECT.to_string()),
                    ("id", format!("eq.{id}")),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_campaigns(&self, funded: Option<bool>) -> Result<Vec<CampaignRecord>> {
        let mut query = vec![
            ("select", CAMPAIGN_SELECT.to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(flag) = funded {
            query.push(("is_funded", format!("eq.{flag}")));
        }
        self.select(CAMPAIGNS_TABLE, &query).await
    }
}
