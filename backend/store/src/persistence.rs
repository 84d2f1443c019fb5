//! Saves a structured bill and opens its campaign.

use std::sync::Arc;

use tracing::{error, info};

use crowdhealth_core::{CrowdError, NewCampaign, NewMedicalBill, Result, SavedBill, StructuredBill};
use logging::redact_sensitive_data;

use crate::store::BillStore;

pub struct PersistenceStage {
    store: Arc<dyn BillStore>,
}

impl PersistenceStage {
    pub fn new(store: Arc<dyn BillStore>) -> Self {
        Self { store }
    }

    /// Write the bill, then a campaign when the total is positive.
    ///
    /// A failed bill write is fatal. A failed campaign write is logged and
    /// the bill id is still returned.
    pub async fn save(
        &self,
        raw_ocr_text: &str,
        structured: &StructuredBill,
        reason: Option<&str>,
    ) -> Result<SavedBill> {
        let bill = self
            .store
            .insert_bill(NewMedicalBill::flatten(raw_ocr_text, structured))
            .await
            .map_err(CrowdError::persistence)?;
        info!(bill_id = %bill.id, store = self.store.name(), "Medical bill saved");

        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string);
        let Some(campaign) = NewCampaign::for_bill(bill.id, structured.record.total_amount, reason) else {
            return Ok(SavedBill { id: bill.id, campaign_id: None });
        };

        match self.store.insert_campaign(campaign).await {
            Ok(campaign) => {
                info!(bill_id = %bill.id, campaign_id = %campaign.id, goal = campaign.goal_amount, "Campaign created");
                Ok(SavedBill { id: bill.id, campaign_id: Some(campaign.id) })
            }
            Err(e) => {
                error!(bill_id = %bill.id, error = %redact_sensitive_data(&format!("{e:#}")), "Campaign creation failed; bill kept");
                Ok(SavedBill { id: bill.id, campaign_id: None })
            }
        }
    }
}
