//! Thin HTTP client for a running gateway.

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use serde_json::Value;

use crowdhealth_core::ChatEvent;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await?;
        read_json(resp).await
    }

    pub async fn scan(&self, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(format!("{}/api/ocr", self.base_url))
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Ask about a campaign, handing each event to `on_event` as it arrives.
    pub async fn ask(
        &self,
        campaign_id: &str,
        query: &str,
        mut on_event: impl FnMut(&ChatEvent),
    ) -> Result<Transcript> {
        let resp = self
            .http
            .post(format!("{}/api/ask-ai", self.base_url))
            .json(&serde_json::json!({ "campaignId": campaign_id, "query": query }))
            .send()
            .await?;
        if !resp.status().is_success() {
            read_json(resp).await?;
            bail!("Chat request failed");
        }

        let mut lines = LineBuffer::default();
        let mut transcript = Transcript::default();
        let mut body = resp.bytes_stream();
        'outer: while let Some(chunk) = body.next().await {
            let chunk = chunk.context("Chat stream interrupted")?;
            for line in lines.push(&chunk) {
                if let Some(event) = ChatEvent::parse_line(&line) {
                    on_event(&event);
                    if !transcript.apply(event) {
                        break 'outer;
                    }
                }
            }
        }
        Ok(transcript)
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body: Value = resp.json().await.context("Response is not JSON")?;
    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("unknown error");
        bail!("{status}: {message}");
    }
    Ok(body)
}

/// Splits a byte stream into lines without breaking multi-byte characters.
#[derive(Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            lines.push(text.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}

/// What a chat stream produced by the time it closed.
#[derive(Debug, Default, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub error: Option<String>,
    pub completed: bool,
}

impl Transcript {
    /// Fold one event in. Returns false once the stream is finished.
    pub fn apply(&mut self, event: ChatEvent) -> bool {
        match event {
            ChatEvent::Text(text) => self.text.push_str(&text),
            ChatEvent::Error(message) => self.error = Some(message),
            ChatEvent::Done => self.completed = true,
        }
        !self.completed
    }
}
