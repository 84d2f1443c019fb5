//! Tolerant field deserializers for model-produced JSON.
//!
//! Language models ignore "numbers only" instructions often enough that the
//! record has to accept `"$1,234.50"`, `"03/15/2024"` and `""` and turn them
//! into a number, an ISO date and `None` respectively. Anything that cannot
//! be read becomes `None` rather than failing the whole record.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::LineItem;

static AMOUNT_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s$,]|USD").unwrap());

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d"];

pub(crate) fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_text(Value::deserialize(d)?))
}

pub(crate) fn description<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(value_to_text(Value::deserialize(d)?).unwrap_or_default())
}

pub(crate) fn amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(value_to_amount(&Value::deserialize(d)?))
}

pub(crate) fn non_negative_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(value_to_amount(&Value::deserialize(d)?).filter(|a| *a >= 0.0))
}

pub(crate) fn date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => parse_date(&s),
        _ => None,
    })
}

pub(crate) fn items<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<LineItem>>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(values) => Some(
            values
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
        ),
        _ => None,
    })
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => AMOUNT_NOISE.replace_all(s, "").parse::<f64>().ok(),
        _ => None,
    };
    amount.filter(|a| a.is_finite())
}

/// Parse a date in one of the layouts bills commonly use.
///
/// Timestamps are cut down to their date part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let candidate = raw.split('T').next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
}
