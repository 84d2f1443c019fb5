use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crowdhealth_core::{
    CampaignRecord, CrowdfundingCampaign, MedicalBill, NewCampaign, NewMedicalBill,
};

/// Abstract interface for the bill/campaign store.
///
/// Each write is a single atomic call; there is no transaction spanning a
/// bill and its campaign.
#[async_trait]
pub trait BillStore: Send + Sync {
    /// Backend name for logs (e.g., "postgrest", "sqlite").
    fn name(&self) -> &str;

    /// Insert a `medical_bills` row and return it as stored.
    async fn insert_bill(&self, bill: NewMedicalBill) -> Result<MedicalBill>;

    /// Insert a `crowdfunding_campaigns` row and return it as stored.
    async fn insert_campaign(&self, campaign: NewCampaign) -> Result<CrowdfundingCampaign>;

    /// Load one campaign joined with its bill. `Ok(None)` when absent.
    async fn campaign_with_bill(&self, id: Uuid) -> Result<Option<CampaignRecord>>;

    /// Campaigns newest-first, optionally filtered by funded state.
    async fn list_campaigns(&self, funded: Option<bool>) -> Result<Vec<CampaignRecord>>;
}

/// In-memory store for tests and throwaway runs.
///
/// Inserts can be made to fail on demand to exercise partial-failure paths.
pub struct InMemoryBillStore {
    bills: Arc<RwLock<HashMap<Uuid, MedicalBill>>>,
    campaigns: Arc<RwLock<HashMap<Uuid, CrowdfundingCampaign>>>,
    fail_bill_inserts: AtomicBool,
    fail_campaign_inserts: AtomicBool,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryBillStore {
    pub fn new() -> Self {
        Self {
            bills: Arc::new(RwLock::new(HashMap::new())),
            campaigns: Arc::new(RwLock::new(HashMap::new())),
            fail_bill_inserts: AtomicBool::new(false),
            fail_campaign_inserts: AtomicBool::new(false),
        }
    }

    pub fn fail_bill_inserts(&self, fail: bool) {
        self.fail_bill_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_campaign_inserts(&self, fail: bool) {
        self.fail_campaign_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn bills(&self) -> Vec<MedicalBill> {
        read(&self.bills).values().cloned().collect()
    }

    pub fn campaigns(&self) -> Vec<CrowdfundingCampaign> {
        read(&self.campaigns).values().cloned().collect()
    }

    fn record_for(&self, campaign: &CrowdfundingCampaign) -> CampaignRecord {
        let bill = read(&self.bills)
            .get(&campaign.medical_bill_id)
            .map(|b| b.fields.clone());
        CampaignRecord {
            campaign: campaign.clone(),
            bill,
        }
    }
}

impl Default for InMemoryBillStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BillStore for InMemoryBillStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_bill(&self, bill: NewMedicalBill) -> Result<MedicalBill> {
        if self.fail_bill_inserts.load(Ordering::SeqCst) {
            bail!("medical_bills insert rejected");
        }
        let stored = MedicalBill {
            id: Uuid::new_v4(),
            raw_ocr_text: bill.raw_ocr_text,
            structured_data: bill.structured_data,
            fields: bill.fields,
            created_at: Some(Utc::now()),
        };
        write(&self.bills).insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn insert_campaign(&self, campaign: NewCampaign) -> Result<CrowdfundingCampaign> {
        if self.fail_campaign_inserts.load(Ordering::SeqCst) {
            bail!("crowdfunding_campaigns insert rejected");
        }
        if !read(&self.bills).contains_key(&campaign.medical_bill_id) {
            bail!("medical bill {} does not exist", campaign.medical_bill_id);
        }
        let mut campaigns = write(&self.campaigns);
        if campaigns
            .values()
            .any(|c| c.medical_bill_id == campaign.medical_bill_id)
        {
            bail!("medical bill {} already has a campaign", campaign.medical_bill_id);
        }
        let now = Utc::now();
        let stored = CrowdfundingCampaign {
            id: Uuid::new_v4(),
            medical_bill_id: campaign.medical_bill_id,
            goal_amount: campaign.goal_amount,
            amount_raised: campaign.amount_raised,
            is_funded: campaign.is_funded,
            reason: campaign.reason,
            created_at: now,
            updated_at: now,
        };
        campaigns.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn campaign_with_bill(&self, id: Uuid) -> Result<Option<CampaignRecord>> {
        let campaign = read(&self.campaigns).get(&id).cloned();
        Ok(campaign.map(|c| self.record_for(&c)))
    }

    async fn list_campaigns(&self, funded: Option<bool>) -> Result<Vec<CampaignRecord>> {
        let mut campaigns: Vec<CrowdfundingCampaign> = read(&self.campaigns)
            .values()
            .filter(|c| funded.is_none_or(|f| c.is_funded == f))
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns.iter().map(|c| self.record_for(c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdhealth_core::StructuredBillRecord;

    fn new_bill(total: Option<f64>) -> NewMedicalBill {
        NewMedicalBill {
            raw_ocr_text: "Total: $450.00".into(),
            structured_data: None,
            fields: StructuredBillRecord {
                patient_name: Some("Jane Doe".into()),
                total_amount: total,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn campaign_joins_its_bill() {
        let store = InMemoryBillStore::new();
        let bill = store.insert_bill(new_bill(Some(450.0))).await.unwrap();
        let campaign = store
            .insert_campaign(NewCampaign::for_bill(bill.id, Some(450.0), None).unwrap())
            .await
            .unwrap();

        let record = store.campaign_with_bill(campaign.id).await.unwrap().unwrap();
        assert_eq!(record.bill.unwrap().patient_name.as_deref(), Some("Jane Doe"));
        assert!(store.campaign_with_bill(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn one_campaign_per_bill() {
        let store = InMemoryBillStore::new();
        let bill = store.insert_bill(new_bill(Some(10.0))).await.unwrap();
        let campaign = NewCampaign::for_bill(bill.id, Some(10.0), None).unwrap();
        store.insert_campaign(campaign.clone()).await.unwrap();
        assert!(store.insert_campaign(campaign).await.is_err());
    }

    #[tokio::test]
    async fn list_filters_by_funded_state() {
        let store = InMemoryBillStore::new();
        let bill = store.insert_bill(new_bill(Some(10.0))).await.unwrap();
        store
            .insert_campaign(NewCampaign::for_bill(bill.id, Some(10.0), None).unwrap())
            .await
            .unwrap();

        assert_eq!(store.list_campaigns(Some(false)).await.unwrap().len(), 1);
        assert!(store.list_campaigns(Some(true)).await.unwrap().is_empty());
        assert_eq!(store.list_campaigns(None).await.unwrap().len(), 1);
    }
}
