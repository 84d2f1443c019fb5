use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crowdhealth_core::{CrowdError, InferenceGateway, LlmRequest, ModelOutput, OcrTask, Result};

/// A scriptable inference gateway that returns canned responses.
///
/// Language-model outputs are consumed in order; once the script runs out the
/// fallback text is returned. Every call is recorded so tests can assert on
/// prompts and on whether the provider was reached at all.
pub struct MockGateway {
    configured: bool,
    ocr_result: std::result::Result<String, String>,
    llm_script: Mutex<VecDeque<std::result::Result<ModelOutput, String>>>,
    fallback: String,
    stream_failure_after: Option<usize>,
    ocr_calls: Mutex<Vec<(usize, OcrTask)>>,
    llm_requests: Mutex<Vec<LlmRequest>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            configured: true,
            ocr_result: Ok("Mock OCR text".to_string()),
            llm_script: Mutex::new(VecDeque::new()),
            fallback: "Mock response".to_string(),
            stream_failure_after: None,
            ocr_calls: Mutex::new(Vec::new()),
            llm_requests: Mutex::new(Vec::new()),
        }
    }

    /// Behave like a provider with no credential configured.
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn with_ocr_text(mut self, text: impl Into<String>) -> Self {
        self.ocr_result = Ok(text.into());
        self
    }

    pub fn with_ocr_failure(mut self, message: impl Into<String>) -> Self {
        self.ocr_result = Err(message.into());
        self
    }

    /// Queue one language-model output.
    pub fn with_llm_output(self, output: ModelOutput) -> Self {
        lock(&self.llm_script).push_back(Ok(output));
        self
    }

    pub fn with_llm_text(self, text: impl Into<String>) -> Self {
        self.with_llm_output(ModelOutput::Text(text.into()))
    }

    /// Queue one language-model failure.
    pub fn with_llm_failure(self, message: impl Into<String>) -> Self {
        lock(&self.llm_script).push_back(Err(message.into()));
        self
    }

    /// Make streamed output fail after `chunks` chunks have been yielded.
    pub fn failing_stream_after(mut self, chunks: usize) -> Self {
        self.stream_failure_after = Some(chunks);
        self
    }

    /// Number of OCR calls that reached the provider, with their image sizes.
    pub fn ocr_calls(&self) -> Vec<(usize, OcrTask)> {
        lock(&self.ocr_calls).clone()
    }

    pub fn llm_requests(&self) -> Vec<LlmRequest> {
        lock(&self.llm_requests).clone()
    }

    fn check_configured(&self) -> Result<()> {
        if self.configured {
            Ok(())
        } else {
            Err(CrowdError::Configuration("mock provider has no credential".into()))
        }
    }

    fn next_output(&self, request: &LlmRequest) -> Result<ModelOutput> {
        lock(&self.llm_requests).push(request.clone());
        match lock(&self.llm_script).pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(CrowdError::provider("mock", message)),
            None => Ok(ModelOutput::Text(self.fallback.clone())),
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    fn ensure_configured(&self) -> Result<()> {
        self.check_configured()
    }

    async fn run_ocr(&self, image: &[u8], task: &OcrTask) -> Result<String> {
        self.check_configured()?;
        lock(&self.ocr_calls).push((image.len(), task.clone()));
        self.ocr_result
            .clone()
            .map_err(|message| CrowdError::provider("mock", message))
    }

    async fn run_language_model(&self, request: &LlmRequest) -> Result<ModelOutput> {
        self.check_configured()?;
        request.options.validate()?;
        self.next_output(request)
    }

    fn stream_language_model<'a>(&'a self, request: &'a LlmRequest) -> BoxStream<'a, Result<String>> {
        let items: Vec<Result<String>> = match self
            .check_configured()
            .and_then(|_| request.options.validate())
            .and_then(|_| self.next_output(request))
        {
            Ok(output) => {
                let mut items: Vec<Result<String>> = output.into_chunks().into_iter().map(Ok).collect();
                if let Some(after) = self.stream_failure_after {
                    items.truncate(after);
                    items.push(Err(CrowdError::provider("mock", "stream interrupted")));
                }
                items
            }
            Err(e) => vec![Err(e)],
        };
        stream::iter(items).boxed()
    }
}
