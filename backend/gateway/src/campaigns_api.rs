//! Read-only campaign endpoints.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crowdhealth_core::{CampaignRecord, CrowdError, CrowdfundingCampaign, StructuredBillRecord};

use crate::error::ApiError;
use crate::server::GatewayState;

/// The bill columns shown on a campaign card.
#[derive(Debug, Serialize)]
pub struct BillSummary {
    pub patient_name: Option<String>,
    pub provider_name: Option<String>,
    pub total_amount: Option<f64>,
    pub service_date: Option<String>,
}

impl From<StructuredBillRecord> for BillSummary {
    fn from(bill: StructuredBillRecord) -> Self {
        Self {
            patient_name: bill.patient_name,
            provider_name: bill.provider_name,
            total_amount: bill.total_amount,
            service_date: bill.service_date.map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub funded: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CampaignSummary {
    #[serde(flatten)]
    pub campaign: CrowdfundingCampaign,
    pub medical_bills: Option<BillSummary>,
}

#[derive(Debug, Serialize)]
pub struct CampaignList {
    pub campaigns: Vec<CampaignSummary>,
}

/// `GET /api/campaigns?funded=<bool>`: newest first.
pub async fn list_campaigns(
    State(state): State<GatewayState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<CampaignList>, ApiError> {
    let Query(query) = query?;
    let records = state
        .store
        .list_campaigns(query.funded)
        .await
        .map_err(CrowdError::persistence)?;
    let campaigns = records
        .into_iter()
        .map(|record| CampaignSummary {
            campaign: record.campaign,
            medical_bills: record.bill.map(BillSummary::from),
        })
        .collect();
    Ok(Json(CampaignList { campaigns }))
}

/// `GET /api/campaigns/:id`
pub async fn get_campaign(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<CampaignRecord>, ApiError> {
    let not_found = || CrowdError::NotFound("Campaign not found".into());
    let id = Uuid::parse_str(id.trim()).map_err(|_| not_found())?;
    let record = state
        .store
        .campaign_with_bill(id)
        .await
        .map_err(CrowdError::persistence)?
        .ok_or_else(not_found)?;
    Ok(Json(record))
}
