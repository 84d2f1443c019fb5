use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::lenient;

/// One billed line on a medical bill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient::description")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub amount: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::date",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<NaiveDate>,
}

/// The fixed-shape record the structuring stage extracts from OCR text.
///
/// Every field is optional: the model may omit whatever it cannot find.
/// Deserialization is lenient so that model output such as `"$450.00"`
/// still lands as a number, and blank strings land as `None`.
/// The same shape doubles as the flattened columns of `medical_bills`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredBillRecord {
    #[serde(default, deserialize_with = "lenient::text")]
    pub patient_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::date")]
    pub patient_dob: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub provider_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub provider_address: Option<String>,
    #[serde(default, deserialize_with = "lenient::date")]
    pub service_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::non_negative_amount")]
    pub total_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient::items")]
    pub items: Option<Vec<LineItem>>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub billing_address: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub account_number: Option<String>,
}

/// Output of the structuring stage: the normalized record plus the model's
/// JSON exactly as it was parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredBill {
    pub record: StructuredBillRecord,
    pub raw: Value,
}

impl StructuredBill {
    /// Parse a JSON value produced by the model.
    ///
    /// Only objects are accepted; the record itself is lenient about field
    /// contents, so this fails only on a non-object payload.
    pub fn from_value(raw: Value) -> crate::Result<Self> {
        if !raw.is_object() {
            return Err(crate::CrowdError::Structuring(format!(
                "expected a JSON object from the model, got {}",
                json_kind(&raw)
            )));
        }
        let record: StructuredBillRecord = serde_json::from_value(raw.clone())
            .map_err(|e| crate::CrowdError::Structuring(format!("unusable bill record: {e}")))?;
        Ok(Self { record, raw })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Row to insert into `medical_bills`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMedicalBill {
    pub raw_ocr_text: String,
    pub structured_data: Option<Value>,
    #[serde(flatten)]
    pub fields: StructuredBillRecord,
}

impl NewMedicalBill {
    /// Flatten a structured bill onto top-level columns, keeping the model's
    /// JSON verbatim in `structured_data`.
    pub fn flatten(raw_ocr_text: impl Into<String>, structured: &StructuredBill) -> Self {
        Self {
            raw_ocr_text: raw_ocr_text.into(),
            structured_data: Some(structured.raw.clone()),
            fields: structured.record.clone(),
        }
    }
}

/// A persisted `medical_bills` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalBill {
    pub id: Uuid,
    #[serde(default)]
    pub raw_ocr_text: String,
    #[serde(default)]
    pub structured_data: Option<Value>,
    #[serde(flatten)]
    pub fields: StructuredBillRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Row to insert into `crowdfunding_campaigns`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCampaign {
    pub medical_bill_id: Uuid,
    pub goal_amount: f64,
    pub amount_raised: f64,
    pub is_funded: bool,
    pub reason: Option<String>,
}

impl NewCampaign {
    /// Build the campaign for a freshly saved bill.
    ///
    /// Returns `None` unless the goal is a finite number strictly greater than 0.
    pub fn for_bill(medical_bill_id: Uuid, goal_amount: Option<f64>, reason: Option<String>) -> Option<Self> {
        let goal_amount = goal_amount.filter(|g| g.is_finite() && *g > 0.0)?;
        Some(Self {
            medical_bill_id,
            goal_amount,
            amount_raised: 0.0,
            is_funded: false,
            reason,
        })
    }
}

/// A persisted `crowdfunding_campaigns` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrowdfundingCampaign {
    pub id: Uuid,
    pub medical_bill_id: Uuid,
    pub goal_amount: f64,
    #[serde(default)]
    pub amount_raised: f64,
    #[serde(default)]
    pub is_funded: bool,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A campaign joined with its bill, shaped like an embedded PostgREST select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    #[serde(flatten)]
    pub campaign: CrowdfundingCampaign,
    #[serde(rename = "medical_bills", default)]
    pub bill: Option<StructuredBillRecord>,
}

/// Identifier of a bill written by the persistence stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedBill {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of a grounded chat. Held by the caller only; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
