//! Grounded chat responder.
//!
//! Validation and the campaign lookup happen before the stream opens, so
//! their failures are ordinary errors. Once streaming, every failure
//! becomes an error event and the stream still ends with `Done`.

use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crowdhealth_core::{
    ChatEvent, ChatTurn, CrowdError, InferenceGateway, LanguageModelOptions, LlmRequest,
    ReasoningEffort, Result, Verbosity,
};
use crowdhealth_store::BillStore;
use logging::{redact_sensitive_data, PipelineEvent, PipelineEventLogger};

use crate::system_prompt::PromptBuilder;

/// Error text sent to the client when the provider fails mid-stream.
pub const CHAT_FAILURE_MESSAGE: &str = "Failed to get AI response";

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default, alias = "campaign_id")]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

pub struct GroundedChat {
    gateway: Arc<dyn InferenceGateway>,
    store: Arc<dyn BillStore>,
}

impl GroundedChat {
    pub fn new(gateway: Arc<dyn InferenceGateway>, store: Arc<dyn BillStore>) -> Self {
        Self { gateway, store }
    }

    fn options() -> LanguageModelOptions {
        LanguageModelOptions {
            reasoning_effort: Some(ReasoningEffort::Minimal),
            verbosity: Some(Verbosity::Medium),
            max_completion_tokens: Some(1000),
            temperature: None,
        }
    }

    /// Validate the request and build the model call from the stored campaign.
    pub async fn prepare(&self, request: &ChatRequest) -> Result<LlmRequest> {
        self.gateway.ensure_configured()?;

        let campaign_id = request.campaign_id.as_deref().map(str::trim).unwrap_or_default();
        let query = request.query.as_deref().map(str::trim).unwrap_or_default();
        if campaign_id.is_empty() || query.is_empty() {
            return Err(CrowdError::validation("Campaign ID and query are required"));
        }

        let not_found = || CrowdError::NotFound("Campaign not found".into());
        let id = Uuid::parse_str(campaign_id).map_err(|_| not_found())?;
        let record = self
            .store
            .campaign_with_bill(id)
            .await
            .map_err(CrowdError::persistence)?
            .ok_or_else(not_found)?;

        Ok(LlmRequest::new(
            PromptBuilder::system_prompt(&record),
            PromptBuilder::user_prompt(&request.history, query),
        )
        .with_options(Self::options()))
    }

    /// Answer a question as a stream of chat events ending with `Done`.
    ///
    /// The provider call runs on its own task and is drained to the end even
    /// if the receiver is dropped.
    #[instrument(skip_all, fields(campaign_id = request.campaign_id.as_deref().unwrap_or_default()))]
    pub async fn answer(&self, request: ChatRequest) -> Result<ReceiverStream<ChatEvent>> {
        let llm_request = self.prepare(&request).await?;
        let request_id = Uuid::new_v4().to_string();
        let gateway = self.gateway.clone();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut chunks = 0usize;
            let mut failed = false;
            {
                let mut stream = gateway.stream_language_model(&llm_request);
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(text) => {
                            chunks += 1;
                            let _ = tx.send(ChatEvent::Text(text)).await;
                        }
                        Err(e) => {
                            error!(request_id = %request_id, error = %redact_sensitive_data(&e.to_string()), "Chat stream failed");
                            failed = true;
                            let _ = tx.send(ChatEvent::Error(CHAT_FAILURE_MESSAGE.into())).await;
                            break;
                        }
                    }
                }
            }
            let _ = tx.send(ChatEvent::Done).await;

            info!(request_id = %request_id, chunks, failed, "Chat stream closed");
            PipelineEventLogger::log_event(&request_id, PipelineEvent::ChatStreamClosed { chunks, failed });
        });

        Ok(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_prompt::ESCAPE_PHRASE;
    use crowdhealth_core::{ModelOutput, NewCampaign, NewMedicalBill, StructuredBillRecord};
    use crowdhealth_inference::MockGateway;
    use crowdhealth_store::InMemoryBillStore;

    async fn seeded(reason: Option<&str>) -> (Arc<InMemoryBillStore>, Uuid) {
        let store = Arc::new(InMemoryBillStore::new());
        let bill = store
            .insert_bill(NewMedicalBill {
                raw_ocr_text: "Total: $450.00\nPatient: Jane Doe".into(),
                structured_data: None,
                fields: StructuredBillRecord {
                    patient_name: Some("Jane Doe".into()),
                    total_amount: Some(450.0),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        let campaign = store
            .insert_campaign(NewCampaign::for_bill(bill.id, Some(450.0), reason.map(str::to_string)).unwrap())
            .await
            .unwrap();
        (store, campaign.id)
    }

    fn ask(id: impl ToString, query: &str) -> ChatRequest {
        ChatRequest {
            campaign_id: Some(id.to_string()),
            query: Some(query.into()),
            history: Vec::new(),
        }
    }

    async fn collect(stream: ReceiverStream<ChatEvent>) -> Vec<ChatEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn chunks_are_forwarded_in_order_then_done() {
        let (store, id) = seeded(Some("Knee surgery")).await;
        let gateway = Arc::new(MockGateway::new().with_llm_output(ModelOutput::Chunks(vec![
            "Patient Name: ".into(),
            "Jane Doe".into(),
        ])));
        let chat = GroundedChat::new(gateway.clone(), store);

        let events = collect(chat.answer(ask(id, "Who is the patient?")).await.unwrap()).await;
        assert_eq!(
            events,
            vec![
                ChatEvent::Text("Patient Name: ".into()),
                ChatEvent::Text("Jane Doe".into()),
                ChatEvent::Done,
            ]
        );

        let request = &gateway.llm_requests()[0];
        assert!(request.system_prompt.contains("- Reason for Help: Knee surgery"));
        assert!(request.user_prompt.ends_with("Who is the patient?"));
        assert_eq!(request.options.max_completion_tokens, Some(1000));
    }

    #[tokio::test]
    async fn null_reason_is_grounded_as_unknown() {
        let (store, id) = seeded(None).await;
        let gateway = Arc::new(MockGateway::new().with_llm_text(ESCAPE_PHRASE));
        let chat = GroundedChat::new(gateway.clone(), store);

        let events = collect(chat.answer(ask(id, "Why does this patient need help?")).await.unwrap()).await;
        assert_eq!(events, vec![ChatEvent::Text(ESCAPE_PHRASE.into()), ChatEvent::Done]);

        let prompt = &gateway.llm_requests()[0].system_prompt;
        assert!(prompt.contains("- Reason for Help: [Not in database]"));
        assert!(prompt.contains(ESCAPE_PHRASE));
    }

    #[tokio::test]
    async fn mid_stream_failure_emits_error_then_done() {
        let (store, id) = seeded(None).await;
        let gateway = Arc::new(
            MockGateway::new()
                .with_llm_output(ModelOutput::Chunks(vec!["Goal ".into(), "Amount".into()]))
                .failing_stream_after(1),
        );
        let chat = GroundedChat::new(gateway, store);

        let events = collect(chat.answer(ask(id, "What is the goal?")).await.unwrap()).await;
        assert_eq!(
            events,
            vec![
                ChatEvent::Text("Goal ".into()),
                ChatEvent::Error(CHAT_FAILURE_MESSAGE.into()),
                ChatEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn provider_failure_before_first_chunk_still_closes() {
        let (store, id) = seeded(None).await;
        let gateway = Arc::new(MockGateway::new().with_llm_failure("rate limited"));
        let chat = GroundedChat::new(gateway, store);

        let events = collect(chat.answer(ask(id, "What is the goal?")).await.unwrap()).await;
        assert_eq!(events, vec![ChatEvent::Error(CHAT_FAILURE_MESSAGE.into()), ChatEvent::Done]);
    }

    #[tokio::test]
    async fn stream_failure_log_hides_tokens() {
        let (logs, _guard) = logging::test_util::CapturedLogs::install();
        let (store, id) = seeded(None).await;
        let gateway = Arc::new(MockGateway::new().with_llm_failure("401 for Bearer r8_AbCdEfGhIjKlMnOpQrSt"));
        let chat = GroundedChat::new(gateway, store);

        collect(chat.answer(ask(id, "What is the goal?")).await.unwrap()).await;

        let text = logs.text();
        assert!(text.contains("Chat stream failed"), "{text}");
        assert!(text.contains("[REDACTED_TOKEN]"), "{text}");
        assert!(!text.contains("r8_AbCdEfGhIjKlMnOpQrSt"), "{text}");
    }

    #[tokio::test]
    async fn unknown_or_malformed_campaign_is_not_found() {
        let (store, _) = seeded(None).await;
        let gateway = Arc::new(MockGateway::new());
        let chat = GroundedChat::new(gateway.clone(), store);

        for id in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
            let err = chat.answer(ask(id, "Who?")).await.unwrap_err();
            assert!(matches!(err, CrowdError::NotFound(ref m) if m == "Campaign not found"));
        }
        assert!(gateway.llm_requests().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_fails_before_the_lookup() {
        let (store, id) = seeded(None).await;
        let gateway = Arc::new(MockGateway::new().unconfigured());
        let chat = GroundedChat::new(gateway.clone(), store);

        let err = chat.answer(ask(id, "What is the goal?")).await.unwrap_err();
        assert!(matches!(err, CrowdError::Configuration(_)));

        // An unknown id would be NotFound if the store were consulted.
        let err = chat.answer(ask(Uuid::new_v4(), "What is the goal?")).await.unwrap_err();
        assert!(matches!(err, CrowdError::Configuration(_)));
        assert!(gateway.llm_requests().is_empty());
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let (store, id) = seeded(None).await;
        let chat = GroundedChat::new(Arc::new(MockGateway::new()), store);

        let err = chat.answer(ask(id, "  ")).await.unwrap_err();
        assert!(matches!(err, CrowdError::Validation(_)));
        let err = chat.answer(ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, CrowdError::Validation(_)));
    }

    #[tokio::test]
    async fn history_reaches_the_prompt() {
        let (store, id) = seeded(None).await;
        let gateway = Arc::new(MockGateway::new());
        let chat = GroundedChat::new(gateway.clone(), store);

        let mut request = ask(id, "And the raised amount?");
        request.history = vec![ChatTurn::user("What is the goal?"), ChatTurn::assistant("Goal Amount: $450.00")];
        collect(chat.answer(request).await.unwrap()).await;

        let prompt = &gateway.llm_requests()[0].user_prompt;
        assert!(prompt.starts_with("Conversation so far:\nUser: What is the goal?\nAssistant: Goal Amount: $450.00"));
    }
}
