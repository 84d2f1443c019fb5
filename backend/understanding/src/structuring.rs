//! Bill structuring: OCR text in, fixed-shape JSON record out.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crowdhealth_core::{
    CrowdError, InferenceGateway, LanguageModelOptions, LlmRequest, ReasoningEffort, Result,
    StructuredBill, Verbosity,
};

pub const STRUCTURING_SYSTEM_PROMPT: &str = "You are a JSON extraction specialist. \
Always return valid JSON only, no markdown, no explanations, no code blocks.";

const EXTRACTION_TARGETS: &str = "\
- patient_name: Full name of the patient
- patient_dob: Date of birth (format: YYYY-MM-DD or null if not found)
- provider_name: Name of the medical provider/facility
- provider_address: Address of the provider
- service_date: Date of service (format: YYYY-MM-DD or null if not found)
- total_amount: Total amount due as a number (null if not found)
- items: Array of line items with description, amount, and optional date
- billing_address: Billing address if different from provider
- account_number: Account or reference number if available";

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?i:json)?\n?").unwrap());

/// Build the extraction prompt for one OCR transcript.
pub fn structuring_prompt(ocr_text: &str) -> String {
    format!(
        "You are a medical bill data extraction specialist. Extract structured information \
from the following OCR text from a medical bill. Return ONLY valid JSON with no additional text.\n\n\
Required fields to extract:\n{EXTRACTION_TARGETS}\n\n\
OCR Text:\n{ocr_text}\n\n\
Return valid JSON only:"
    )
}

/// Remove fenced code-block markers the model may add despite instructions.
pub fn strip_code_fences(output: &str) -> String {
    CODE_FENCE.replace_all(output, "").trim().to_string()
}

pub struct BillStructurer {
    gateway: Arc<dyn InferenceGateway>,
}

impl BillStructurer {
    pub fn new(gateway: Arc<dyn InferenceGateway>) -> Self {
        Self { gateway }
    }

    fn options() -> LanguageModelOptions {
        LanguageModelOptions {
            reasoning_effort: Some(ReasoningEffort::Minimal),
            verbosity: Some(Verbosity::Low),
            max_completion_tokens: Some(2000),
            temperature: None,
        }
    }

    /// Ask the language model for the bill record and parse its reply.
    pub async fn structure(&self, ocr_text: &str) -> Result<StructuredBill> {
        if ocr_text.trim().is_empty() {
            return Err(CrowdError::validation("OCR text is required"));
        }

        let request = LlmRequest::new(STRUCTURING_SYSTEM_PROMPT, structuring_prompt(ocr_text))
            .with_options(Self::options());
        let output = self.gateway.run_language_model(&request).await?.into_text();
        let json = strip_code_fences(&output);

        let value: serde_json::Value = serde_json::from_str(&json).map_err(|e| {
            warn!(error = %e, output_len = json.len(), "Model output is not valid JSON");
            CrowdError::Structuring("Failed to parse structured data from AI model".into())
        })?;

        let bill = StructuredBill::from_value(value)?;
        debug!(
            has_total = bill.record.total_amount.is_some(),
            items = bill.record.items.as_ref().map(Vec::len).unwrap_or(0),
            "Structured bill parsed"
        );
        Ok(bill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdhealth_core::ModelOutput;
    use crowdhealth_inference::MockGateway;

    #[test]
    fn prompt_lists_every_target_and_embeds_text() {
        let prompt = structuring_prompt("Patient: Jane Doe");
        for field in [
            "patient_name",
            "patient_dob",
            "provider_name",
            "provider_address",
            "service_date",
            "total_amount",
            "items",
            "billing_address",
            "account_number",
        ] {
            assert!(prompt.contains(field), "missing {field}");
        }
        assert!(prompt.contains("OCR Text:\nPatient: Jane Doe"));
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```JSON{}```"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[tokio::test]
    async fn parses_chunked_fenced_output() {
        let gateway = Arc::new(MockGateway::new().with_llm_output(ModelOutput::Chunks(vec![
            "```json\n{\"patient_name\": \"Jane Doe\",".into(),
            " \"total_amount\": 450, \"items\": []}\n```".into(),
        ])));
        let structurer = BillStructurer::new(gateway.clone());

        let bill = structurer.structure("Total: $450.00\nPatient: Jane Doe").await.unwrap();
        assert_eq!(bill.record.patient_name.as_deref(), Some("Jane Doe"));
        assert_eq!(bill.record.total_amount, Some(450.0));
        assert_eq!(bill.record.items, Some(vec![]));

        let requests = gateway.llm_requests();
        assert_eq!(requests[0].system_prompt, STRUCTURING_SYSTEM_PROMPT);
        assert_eq!(requests[0].options.max_completion_tokens, Some(2000));
    }

    #[tokio::test]
    async fn unparseable_output_is_a_structuring_error() {
        let gateway = Arc::new(MockGateway::new().with_llm_text("Sorry, I cannot read this bill."));
        let structurer = BillStructurer::new(gateway);

        let err = structurer.structure("garbled").await.unwrap_err();
        assert!(matches!(err, CrowdError::Structuring(_)));
    }

    #[tokio::test]
    async fn empty_text_never_reaches_the_provider() {
        let gateway = Arc::new(MockGateway::new());
        let structurer = BillStructurer::new(gateway.clone());

        let err = structurer.structure("  \n").await.unwrap_err();
        assert!(matches!(err, CrowdError::Validation(_)));
        assert!(gateway.llm_requests().is_empty());
    }
}
