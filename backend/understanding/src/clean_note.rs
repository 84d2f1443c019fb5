//! Job-site note clean-up.
//!
//! Turns messy handwriting transcripts into readable paragraphs without
//! adding or dropping facts.

use std::sync::Arc;

use tracing::info;

use crowdhealth_core::{
    CrowdError, InferenceGateway, LanguageModelOptions, LlmRequest, ReasoningEffort, Result,
    Verbosity,
};

pub const CLEAN_NOTE_SYSTEM_PROMPT: &str = "You are assisting a construction contractor with job-site notes. \
Your job is to transform messy contractor handwriting and OCR errors into clean, well-organized, professional text.\n\n\
CRITICAL RULES:\n\
1. Do NOT invent, add, or remove information that is not in the original text.\n\
2. Preserve all numbers, measurements, dates, and dollar amounts exactly as written.\n\
3. Organize the text into proper paragraphs with correct grammar, spelling, and punctuation.\n\
4. Fix all spelling mistakes, duplicate words, and OCR errors.\n\
5. Fix contractor shorthand and abbreviations when the meaning is clear.\n\
6. Use proper capitalization, punctuation, and sentence structure.\n\
7. Group related information into logical paragraphs.\n\
8. If a word is unclear or ambiguous, leave it as-is rather than guessing.\n\n\
Return ONLY the cleaned, organized text in paragraph form. No explanations, no markdown, no JSON.";

pub fn clean_note_prompt(text: &str) -> String {
    format!(
        "Transform this job-site note into clean, well-organized text with proper grammar, spelling, \
and punctuation. Organize it into paragraphs. Keep all numbers, measurements, and dollar amounts \
exactly as written:\n\n{text}"
    )
}

pub struct NoteCleaner {
    gateway: Arc<dyn InferenceGateway>,
}

impl NoteCleaner {
    pub fn new(gateway: Arc<dyn InferenceGateway>) -> Self {
        Self { gateway }
    }

    pub async fn clean(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(CrowdError::validation("Text is required"));
        }

        let request = LlmRequest::new(CLEAN_NOTE_SYSTEM_PROMPT, clean_note_prompt(text)).with_options(
            LanguageModelOptions {
                reasoning_effort: Some(ReasoningEffort::Minimal),
                verbosity: Some(Verbosity::Low),
                max_completion_tokens: Some(3000),
                temperature: Some(0.4),
            },
        );

        let cleaned = self.gateway.run_language_model(&request).await?.into_text();
        info!(input_chars = text.len(), output_chars = cleaned.len(), "Note cleaned");
        Ok(cleaned.trim().to_string())
    }
}
