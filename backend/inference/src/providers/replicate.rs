use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crowdhealth_core::{CrowdError, InferenceGateway, LlmRequest, ModelOutput, OcrTask, Result};

use super::sse::{SseDecoder, SseMessage};

const PROVIDER: &str = "replicate";

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";
pub const DEFAULT_OCR_MODEL: &str =
    "lucataco/deepseek-ocr:cb3b474fbfc56b1664c8c7841550bccecbe7b74c30e45ce938ffca1180b4dff5";
pub const DEFAULT_LANGUAGE_MODEL: &str = "openai/gpt-5-nano";

/// Poll cap for one prediction: the default 300 s request budget at the
/// default 1 s interval.
pub const MAX_POLLS: u32 = 300;

/// Replicate-hosted inference: file upload, predictions, output streaming.
pub struct ReplicateGateway {
    client: Client,
    api_token: Option<String>,
    base_url: String,
    ocr_model: String,
    language_model: String,
    poll_interval: Duration,
    max_polls: u32,
    prefer_wait_secs: u32,
}

impl ReplicateGateway {
    /// A gateway without a token is valid to construct; every call on it
    /// fails with a configuration error before touching the network.
    pub fn new(api_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_token: api_token.filter(|t| !t.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            ocr_model: DEFAULT_OCR_MODEL.to_string(),
            language_model: DEFAULT_LANGUAGE_MODEL.to_string(),
            poll_interval: Duration::from_secs(1),
            max_polls: MAX_POLLS,
            prefer_wait_secs: 60,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, ocr_model: impl Into<String>, language_model: impl Into<String>) -> Self {
        self.ocr_model = ocr_model.into();
        self.language_model = language_model.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Give up on a prediction after this many status polls.
    pub fn with_max_polls(mut self, polls: u32) -> Self {
        self.max_polls = polls;
        self
    }

    pub fn with_prefer_wait(mut self, secs: u32) -> Self {
        self.prefer_wait_secs = secs;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_token.is_some()
    }

    fn token(&self) -> Result<&str> {
        self.api_token
            .as_deref()
            .ok_or_else(|| CrowdError::Configuration("REPLICATE_API_TOKEN is not configured".into()))
    }

    async fn upload_file(&self, token: &str, image: &[u8]) -> anyhow::Result<String> {
        let part = Part::bytes(image.to_vec())
            .file_name("upload")
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("content", part);

        debug!(size = image.len(), "Uploading file to Replicate");

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .context("Replicate file upload failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!("Replicate file upload returned {}: {}", status, error_body);
        }

        let file: UploadedFile = response
            .json()
            .await
            .context("Failed to parse Replicate file response")?;
        Ok(file.urls.get)
    }

    async fn create_prediction(
        &self,
        token: &str,
        model: &str,
        input: Value,
        stream: bool,
    ) -> anyhow::Result<Prediction> {
        let (url, body) = match model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.base_url),
                json!({ "version": version, "input": input, "stream": stream }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.base_url, model),
                json!({ "input": input, "stream": stream }),
            ),
        };

        debug!(model = %model, stream, "Creating Replicate prediction");

        let mut request = self.client.post(url).bearer_auth(token).json(&body);
        if !stream && self.prefer_wait_secs > 0 {
            request = request.header("Prefer", format!("wait={}", self.prefer_wait_secs));
        }

        let response = request
            .send()
            .await
            .context("Replicate prediction request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!("Replicate returned {}: {}", status, error_body);
        }

        response
            .json()
            .await
            .context("Failed to parse Replicate prediction")
    }

    /// Poll until the prediction leaves the starting/processing states.
    async fn wait_for(&self, token: &str, mut prediction: Prediction) -> anyhow::Result<Prediction> {
        let mut polls = 0u32;
        while prediction.status.is_pending() {
            let Some(url) = prediction.urls.as_ref().and_then(|u| u.get.clone()) else {
                bail!("prediction {} has no polling URL", prediction.id);
            };
            if polls >= self.max_polls {
                bail!("prediction {} still {:?} after {} polls", prediction.id, prediction.status, polls);
            }
            polls += 1;
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .context("Replicate poll request failed")?;
            let status = response.status();
            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                bail!("Replicate poll returned {}: {}", status, error_body);
            }
            prediction = response
                .json()
                .await
                .context("Failed to parse Replicate prediction")?;
        }
        Ok(prediction)
    }

    async fn run(&self, model: &str, input: Value) -> Result<ModelOutput> {
        let token = self.token()?;
        let start = Instant::now();

        let prediction = self
            .create_prediction(token, model, input, false)
            .await
            .map_err(provider_error)?;
        let prediction = self.wait_for(token, prediction).await.map_err(provider_error)?;

        info!(
            model = %model,
            prediction = %prediction.id,
            latency_ms = start.elapsed().as_millis() as u64,
            "Replicate prediction finished"
        );
        prediction.into_output()
    }

    /// Start a streaming prediction and turn its event stream into text chunks.
    async fn open_stream(&self, request: &LlmRequest) -> Result<BoxStream<'static, Result<String>>> {
        let token = self.token()?;
        request.options.validate()?;

        let prediction = self
            .create_prediction(token, &self.language_model, language_model_input(request), true)
            .await
            .map_err(provider_error)?;

        let Some(stream_url) = prediction.urls.as_ref().and_then(|u| u.stream.clone()) else {
            // Model does not support streaming: fall back to the finished output.
            warn!(prediction = %prediction.id, "No stream URL; waiting for full output");
            let prediction = self.wait_for(token, prediction).await.map_err(provider_error)?;
            let chunks = prediction.into_output()?.into_chunks();
            return Ok(stream::iter(chunks.into_iter().map(Ok)).boxed());
        };

        let response = self
            .client
            .get(&stream_url)
            .bearer_auth(token)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-store")
            .send()
            .await
            .context("Replicate stream request failed")
            .map_err(provider_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(CrowdError::provider(
                PROVIDER,
                format!("Replicate stream returned {status}: {error_body}"),
            ));
        }

        Ok(output_events(response.bytes_stream().boxed()))
    }
}

#[async_trait]
impl InferenceGateway for ReplicateGateway {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn ensure_configured(&self) -> Result<()> {
        self.token().map(|_| ())
    }

    async fn run_ocr(&self, image: &[u8], task: &OcrTask) -> Result<String> {
        let token = self.token()?;
        let image_url = self.upload_file(token, image).await.map_err(provider_error)?;

        let input = json!({
            "image": image_url,
            "task_type": task.task_type,
            "resolution_size": task.resolution_size,
        });
        let model = self.ocr_model.clone();
        Ok(self.run(&model, input).await?.into_text())
    }

    async fn run_language_model(&self, request: &LlmRequest) -> Result<ModelOutput> {
        self.token()?;
        request.options.validate()?;
        let model = self.language_model.clone();
        self.run(&model, language_model_input(request)).await
    }

    fn stream_language_model<'a>(&'a self, request: &'a LlmRequest) -> BoxStream<'a, Result<String>> {
        stream::once(self.open_stream(request))
            .flat_map(|opened| match opened {
                Ok(chunks) => chunks.left_stream(),
                Err(e) => stream::once(future::ready(Err(e))).right_stream(),
            })
            .boxed()
    }
}

fn provider_error(err: anyhow::Error) -> CrowdError {
    CrowdError::provider(PROVIDER, format!("{err:#}"))
}

fn language_model_input(request: &LlmRequest) -> Value {
    let mut input = Map::new();
    input.insert("prompt".into(), Value::String(request.user_prompt.clone()));
    input.insert("system_prompt".into(), Value::String(request.system_prompt.clone()));
    if let Ok(Value::Object(options)) = serde_json::to_value(&request.options) {
        input.extend(options);
    }
    Value::Object(input)
}

struct StreamState {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<SseMessage>,
    finished: bool,
}

/// Map Replicate's `output` / `error` / `done` events onto text chunks.
fn output_events(bytes: BoxStream<'static, reqwest::Result<Bytes>>) -> BoxStream<'static, Result<String>> {
    let state = StreamState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(message) = st.pending.pop_front() {
                match message.event.as_str() {
                    "output" => return Some((Ok(message.data), st)),
                    "error" => {
                        st.pending.clear();
                        st.finished = true;
                        return Some((Err(CrowdError::provider(PROVIDER, message.data)), st));
                    }
                    "done" => return None,
                    _ => continue,
                }
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let messages = st.decoder.push(&chunk);
                    st.pending.extend(messages);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(CrowdError::provider(PROVIDER, format!("stream read failed: {e}"))), st));
                }
                None => {
                    let messages = st.decoder.finish();
                    st.pending.extend(messages);
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[derive(Deserialize)]
struct UploadedFile {
    urls: FileUrls,
}

#[derive(Deserialize)]
struct FileUrls {
    get: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    fn is_pending(self) -> bool {
        matches!(self, Self::Starting | Self::Processing)
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
    #[serde(default)]
    stream: Option<String>,
}

impl Prediction {
    fn into_output(self) -> Result<ModelOutput> {
        match self.status {
            PredictionStatus::Succeeded => Ok(output_from_value(self.output.unwrap_or(Value::Null))),
            status => {
                let message = match self.error {
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => format!("prediction {} ended with status {:?}", self.id, status),
                };
                Err(CrowdError::provider(PROVIDER, message))
            }
        }
    }
}

/// Replicate returns either a string or an array of string chunks.
fn output_from_value(value: Value) -> ModelOutput {
    match value {
        Value::String(text) => ModelOutput::Text(text),
        Value::Array(items) => ModelOutput::Chunks(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        ),
        Value::Null => ModelOutput::Text(String::new()),
        other => ModelOutput::Text(other.to_string()),
    }
}
