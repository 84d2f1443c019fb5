use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{CrowdError, Result};

/// The external inference provider: OCR and language-model calls.
///
/// Implementations make every call at most once; retrying is the caller's
/// business. A missing credential must surface as
/// [`CrowdError::Configuration`] before any network call is attempted.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Provider name (e.g., "replicate", "mock").
    fn name(&self) -> &str;

    /// Fail with [`CrowdError::Configuration`] when no credential is set.
    ///
    /// Callers that do other I/O before reaching the provider check this first.
    fn ensure_configured(&self) -> Result<()> {
        Ok(())
    }

    /// Upload the image and run the OCR model over it.
    async fn run_ocr(&self, image: &[u8], task: &OcrTask) -> Result<String>;

    /// Run the language model and return its full output.
    async fn run_language_model(&self, request: &LlmRequest) -> Result<ModelOutput>;

    /// Run the language model, yielding output chunks in arrival order.
    ///
    /// The default runs [`run_language_model`](Self::run_language_model) and
    /// replays its chunks; providers with a native streaming transport
    /// override this.
    fn stream_language_model<'a>(&'a self, request: &'a LlmRequest) -> BoxStream<'a, Result<String>> {
        stream::once(self.run_language_model(request))
            .flat_map(|outcome| match outcome {
                Ok(output) => stream::iter(output.into_chunks().into_iter().map(Ok)).left_stream(),
                Err(e) => stream::once(future::ready(Err(e))).right_stream(),
            })
            .boxed()
    }
}

/// Parameters passed to the OCR model alongside the uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrTask {
    pub task_type: String,
    pub resolution_size: String,
}

impl OcrTask {
    pub const DEFAULT_TASK_TYPE: &'static str = "Free OCR";
    pub const DEFAULT_RESOLUTION: &'static str = "Gundam (Recommended)";

    pub fn new(task_type: impl Into<String>, resolution_size: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            resolution_size: resolution_size.into(),
        }
    }
}

impl Default for OcrTask {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TASK_TYPE, Self::DEFAULT_RESOLUTION)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Low,
    Medium,
    High,
}

/// Optional knobs recognized by the language model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl LanguageModelOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_completion_tokens == Some(0) {
            return Err(CrowdError::validation("max_completion_tokens must be positive"));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(CrowdError::validation(format!(
                    "temperature must be within 0..1, got {t}"
                )));
            }
        }
        Ok(())
    }
}

/// Request to the language model.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub options: LanguageModelOptions,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            options: LanguageModelOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LanguageModelOptions) -> Self {
        self.options = options;
        self
    }
}

/// Model output: either one string or a sequence of string chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOutput {
    Text(String),
    Chunks(Vec<String>),
}

impl ModelOutput {
    /// Concatenate in arrival order with no separator.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Chunks(chunks) => chunks.concat(),
        }
    }

    pub fn into_chunks(self) -> Vec<String> {
        match self {
            Self::Text(text) => vec![text],
            Self::Chunks(chunks) => chunks,
        }
    }
}
