/// SQLite-backed bill store for local development.
///
/// Mirrors the hosted schema: `medical_bills` holds the flattened bill
/// columns, `crowdfunding_campaigns` references it with at most one campaign
/// per bill. Dates are ISO-8601 text, `items` and `structured_data` are JSON text.
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crowdhealth_core::{
    CampaignRecord, CrowdfundingCampaign, LineItem, MedicalBill, NewCampaign, NewMedicalBill,
    StructuredBillRecord,
};

use crate::store::BillStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS medical_bills (
    id               TEXT PRIMARY KEY,
    raw_ocr_text     TEXT NOT NULL,
    structured_data  TEXT,
    patient_name     TEXT,
    patient_dob      TEXT,
    provider_name    TEXT,
    provider_address TEXT,
    service_date     TEXT,
    total_amount     REAL,
    items            TEXT,
    billing_address  TEXT,
    account_number   TEXT,
    created_at       TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS crowdfunding_campaigns (
    id              TEXT PRIMARY KEY,
    medical_bill_id TEXT NOT NULL UNIQUE REFERENCES medical_bills(id),
    goal_amount     REAL NOT NULL CHECK (goal_amount > 0),
    amount_raised   REAL NOT NULL DEFAULT 0,
    is_funded       INTEGER NOT NULL DEFAULT 0,
    reason          TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_campaigns_created ON crowdfunding_campaigns(created_at);";

const CAMPAIGN_SELECT: &str = "
SELECT c.id, c.medical_bill_id, c.goal_amount, c.amount_raised, c.is_funded, c.reason,
       c.created_at, c.updated_at,
       b.id, b.patient_name, b.patient_dob, b.provider_name, b.provider_address,
       b.service_date, b.total_amount, b.items, b.billing_address, b.account_number
FROM crowdfunding_campaigns c
LEFT JOIN medical_bills b ON b.id = c.medical_bill_id";

pub struct SqliteBillStore {
    conn: Mutex<Connection>,
}

impl SqliteBillStore {
    /// Create or open a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open SQLite database at {:?}", path.as_ref()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize bill schema")?;

        info!("SqliteBillStore opened at {:?}", path.as_ref());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_date(text: Option<String>) -> Option<NaiveDate> {
    text.and_then(|t| t.parse().ok())
}

// Fixed-width so that text ordering matches time ordering.
fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_uuid(text: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CampaignRecord> {
    let id: String = row.get(0)?;
    let bill_id: String = row.get(1)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    let campaign = CrowdfundingCampaign {
        id: parse_uuid(&id)?,
        medical_bill_id: parse_uuid(&bill_id)?,
        goal_amount: row.get(2)?,
        amount_raised: row.get(3)?,
        is_funded: row.get(4)?,
        reason: row.get(5)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    };

    let joined: Option<String> = row.get(8)?;
    let bill = match joined {
        None => None,
        Some(_) => {
            let items: Option<String> = row.get(15)?;
            Some(StructuredBillRecord {
                patient_name: row.get(9)?,
                patient_dob: parse_date(row.get(10)?),
                provider_name: row.get(11)?,
                provider_address: row.get(12)?,
                service_date: parse_date(row.get(13)?),
                total_amount: row.get(14)?,
                items: items.and_then(|json| serde_json::from_str::<Vec<LineItem>>(&json).ok()),
                billing_address: row.get(16)?,
                account_number: row.get(17)?,
            })
        }
    };

    Ok(CampaignRecord { campaign, bill })
}

#[async_trait]
impl BillStore for SqliteBillStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_bill(&self, bill: NewMedicalBill) -> Result<MedicalBill> {
        let conn = self.conn.lock().await;
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let fields = &bill.fields;
        let items = fields.items.as_ref().map(serde_json::to_string).transpose()?;
        let structured = bill.structured_data.as_ref().map(serde_json::to_string).transpose()?;

        conn.execute(
            "INSERT INTO medical_bills (
                 id, raw_ocr_text, structured_data, patient_name, patient_dob, provider_name,
                 provider_address, service_date, total_amount, items, billing_address,
                 account_number, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                id.to_string(),
                bill.raw_ocr_text,
                structured,
                fields.patient_name,
                date_text(fields.patient_dob),
                fields.provider_name,
                fields.provider_address,
                date_text(fields.service_date),
                fields.total_amount,
                items,
                fields.billing_address,
                fields.account_number,
                timestamp_text(created_at),
            ],
        )
        .context("medical_bills insert failed")?;
        debug!("Inserted medical bill {}", id);

        Ok(MedicalBill {
            id,
            raw_ocr_text: bill.raw_ocr_text,
            structured_data: bill.structured_data,
            fields: bill.fields,
            created_at: Some(created_at),
        })
    }

    async fn insert_campaign(&self, campaign: NewCampaign) -> Result<CrowdfundingCampaign> {
        let conn = self.conn.lock().await;
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO crowdfunding_campaigns (
                 id, medical_bill_id, goal_amount, amount_raised, is_funded, reason,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id.to_string(),
                campaign.medical_bill_id.to_string(),
                campaign.goal_amount,
                campaign.amount_raised,
                campaign.is_funded,
                campaign.reason,
                timestamp_text(now),
            ],
        )
        .context("crowdfunding_campaigns insert failed")?;
        debug!("Inserted campaign {} for bill {}", id, campaign.medical_bill_id);

        Ok(CrowdfundingCampaign {
            id,
            medical_bill_id: campaign.medical_bill_id,
            goal_amount: campaign.goal_amount,
            amount_raised: campaign.amount_raised,
            is_funded: campaign.is_funded,
            reason: campaign.reason,
            created_at: now,
            updated_at: now,
        })
    }

    async fn campaign_with_bill(&self, id: Uuid) -> Result<Option<CampaignRecord>> {
        let conn = self.conn.lock().await;
        let sql = format!("{CAMPAIGN_SELECT} WHERE c.id = ?1");
        let record = conn
            .query_row(&sql, params![id.to_string()], row_to_record)
            .optional()?;
        Ok(record)
    }

    async fn list_campaigns(&self, funded: Option<bool>) -> Result<Vec<CampaignRecord>> {
        let conn = self.conn.lock().await;
        let order = "ORDER BY c.created_at DESC, c.rowid DESC";

        let records = match funded {
            Some(flag) => {
                let sql = format!("{CAMPAIGN_SELECT} WHERE c.is_funded = ?1 {order}");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![flag], row_to_record)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let sql = format!("{CAMPAIGN_SELECT} {order}");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], row_to_record)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bill() -> NewMedicalBill {
        NewMedicalBill {
            raw_ocr_text: "Total: $450.00".into(),
            structured_data: Some(json!({ "total_amount": 450 })),
            fields: StructuredBillRecord {
                patient_name: Some("Jane Doe".into()),
                service_date: NaiveDate::from_ymd_opt(2024, 5, 1),
                total_amount: Some(450.0),
                items: Some(vec![LineItem {
                    description: "X-ray".into(),
                    amount: Some(200.0),
                    date: None,
                }]),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn stores_and_joins_bill_columns() {
        let store = SqliteBillStore::in_memory().unwrap();
        let saved = store.insert_bill(bill()).await.unwrap();
        let campaign = store
            .insert_campaign(NewCampaign::for_bill(saved.id, Some(450.0), Some("surgery".into())).unwrap())
            .await
            .unwrap();

        let record = store.campaign_with_bill(campaign.id).await.unwrap().unwrap();
        assert_eq!(record.campaign.goal_amount, 450.0);
        assert_eq!(record.campaign.reason.as_deref(), Some("surgery"));
        assert!(!record.campaign.is_funded);

        let joined = record.bill.unwrap();
        assert_eq!(joined.patient_name.as_deref(), Some("Jane Doe"));
        assert_eq!(joined.service_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(joined.items.unwrap()[0].description, "X-ray");
        assert_eq!(joined.provider_name, None);
    }

    #[tokio::test]
    async fn rejects_second_campaign_and_non_positive_goal() {
        let store = SqliteBillStore::in_memory().unwrap();
        let saved = store.insert_bill(bill()).await.unwrap();
        let campaign = NewCampaign::for_bill(saved.id, Some(450.0), None).unwrap();
        store.insert_campaign(campaign.clone()).await.unwrap();
        assert!(store.insert_campaign(campaign).await.is_err());

        let other = store.insert_bill(bill()).await.unwrap();
        let zero_goal = NewCampaign {
            medical_bill_id: other.id,
            goal_amount: 0.0,
            amount_raised: 0.0,
            is_funded: false,
            reason: None,
        };
        assert!(store.insert_campaign(zero_goal).await.is_err());
    }

    #[tokio::test]
    async fn lists_newest_first_with_filter() {
        let store = SqliteBillStore::in_memory().unwrap();
        let first = store.insert_bill(bill()).await.unwrap();
        let second = store.insert_bill(bill()).await.unwrap();
        let older = store
            .insert_campaign(NewCampaign::for_bill(first.id, Some(10.0), None).unwrap())
            .await
            .unwrap();
        let newer = store
            .insert_campaign(NewCampaign::for_bill(second.id, Some(20.0), None).unwrap())
            .await
            .unwrap();

        let all = store.list_campaigns(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].campaign.id, newer.id);
        assert_eq!(all[1].campaign.id, older.id);

        assert_eq!(store.list_campaigns(Some(false)).await.unwrap().len(), 2);
        assert!(store.list_campaigns(Some(true)).await.unwrap().is_empty());
        assert!(store.campaign_with_bill(Uuid::new_v4()).await.unwrap().is_none());
    }
}
