//! Grounded chat prompt builder.
//!
//! The model only ever sees one campaign, rendered as a fixed list of
//! labelled fields. Every field is always present; absent values are
//! written as [`NOT_IN_DATABASE`] so "empty" and "omitted" look the same.

use std::fmt::Write as _;

use chrono::NaiveDate;

use crowdhealth_core::{CampaignRecord, ChatRole, ChatTurn, LineItem};

pub const NOT_IN_DATABASE: &str = "[Not in database]";
pub const ESCAPE_PHRASE: &str = "This information is not available in the campaign data";

pub struct PromptBuilder;

impl PromptBuilder {
    /// Render the context block for one campaign and its bill.
    pub fn context_block(record: &CampaignRecord) -> String {
        let campaign = &record.campaign;
        let bill = record.bill.clone().unwrap_or_default();

        let mut out = String::from("CAMPAIGN INFORMATION:\n");
        field(&mut out, "Campaign ID", Some(campaign.id.to_string()));
        field(&mut out, "Goal Amount", Some(money(campaign.goal_amount)));
        field(&mut out, "Amount Raised", Some(money(campaign.amount_raised)));
        field(&mut out, "Is Funded", Some(if campaign.is_funded { "Yes" } else { "No" }.to_string()));
        field(&mut out, "Reason for Help", text(campaign.reason.as_deref()));
        field(&mut out, "Created", Some(campaign.created_at.to_rfc3339()));
        field(&mut out, "Last Updated", Some(campaign.updated_at.to_rfc3339()));

        out.push_str("\nMEDICAL BILL INFORMATION:\n");
        field(&mut out, "Patient Name", text(bill.patient_name.as_deref()));
        field(&mut out, "Patient DOB", bill.patient_dob.map(date));
        field(&mut out, "Provider Name", text(bill.provider_name.as_deref()));
        field(&mut out, "Provider Address", text(bill.provider_address.as_deref()));
        field(&mut out, "Service Date", bill.service_date.map(date));
        field(&mut out, "Total Amount", bill.total_amount.map(money));
        field(&mut out, "Billing Address", text(bill.billing_address.as_deref()));
        field(&mut out, "Account Number", text(bill.account_number.as_deref()));
        match bill.items.as_deref() {
            Some(items) if !items.is_empty() => {
                out.push_str("- Items:\n");
                for item in items {
                    out.push_str(&line_item(item));
                }
            }
            _ => field(&mut out, "Items", None),
        }
        out
    }

    pub fn system_prompt(record: &CampaignRecord) -> String {
        format!(
            "You are an assistant that answers questions about one medical-bill crowdfunding campaign.\n\n\
CRITICAL RULES:\n\
1. ONLY use the information in the context below. It is the complete database record.\n\
2. Do NOT make up, infer, assume, estimate, or combine fields into new facts.\n\
3. A field shown as {NOT_IN_DATABASE} has no stored value. Treat it as unknown.\n\
4. Free-text fields such as \"Reason for Help\" may be quoted word for word but never explained, expanded, or interpreted.\n\
5. If the question cannot be answered from the context, reply exactly: \"{ESCAPE_PHRASE}\"\n\
6. Answer in a structured format: one labelled line per fact, for example \"Goal Amount: $450.00\".\n\
7. Do not answer general questions unrelated to this campaign.\n\n\
Context:\n{}",
            Self::context_block(record)
        )
    }

    /// The question, preceded by any earlier turns in send order.
    pub fn user_prompt(history: &[ChatTurn], query: &str) -> String {
        let mut out = String::new();
        if !history.is_empty() {
            out.push_str("Conversation so far:\n");
            for turn in history {
                let speaker = match turn.role {
                    ChatRole::User => "User",
                    ChatRole::Assistant => "Assistant",
                };
                let _ = writeln!(out, "{speaker}: {}", turn.content.trim());
            }
            out.push('\n');
        }
        let _ = write!(
            out,
            "Based on the campaign and medical bill data provided, answer this question: {}",
            query.trim()
        );
        out
    }
}

fn field(out: &mut String, label: &str, value: Option<String>) {
    let _ = writeln!(out, "- {label}: {}", value.as_deref().unwrap_or(NOT_IN_DATABASE));
}

fn text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn money(amount: f64) -> String {
    format!("${amount:.2}")
}

fn date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn line_item(item: &LineItem) -> String {
    let description = text(Some(&item.description)).unwrap_or_else(|| NOT_IN_DATABASE.to_string());
    let amount = item.amount.map(money).unwrap_or_else(|| NOT_IN_DATABASE.to_string());
    match item.date {
        Some(d) => format!("  - {description}: {amount} (date: {})\n", date(d)),
        None => format!("  - {description}: {amount}\n"),
    }
}
