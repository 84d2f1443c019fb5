//! Main HTTP Gateway Server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, instrument};

use crowdhealth_core::InferenceGateway;
use crowdhealth_pipeline::{BillPipeline, GroundedChat};
use crowdhealth_store::BillStore;
use crowdhealth_understanding::{BillStructurer, NoteCleaner};

use crate::{campaigns_api, chat_api, health_api, ocr_api, text_api, upload_gate};

/// Photos arrive base64-encoded inside JSON.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub pipeline: Arc<BillPipeline>,
    pub chat: Arc<GroundedChat>,
    pub structurer: Arc<BillStructurer>,
    pub cleaner: Arc<NoteCleaner>,
    pub store: Arc<dyn BillStore>,
    pub upload_password: Option<String>,
}

impl GatewayState {
    /// Wire every stage to one inference provider and one store.
    pub fn new(gateway: Arc<dyn InferenceGateway>, store: Arc<dyn BillStore>) -> Self {
        Self {
            pipeline: Arc::new(BillPipeline::new(gateway.clone(), store.clone())),
            chat: Arc::new(GroundedChat::new(gateway.clone(), store.clone())),
            structurer: Arc::new(BillStructurer::new(gateway.clone())),
            cleaner: Arc::new(NoteCleaner::new(gateway)),
            store,
            upload_password: None,
        }
    }

    pub fn with_upload_password(mut self, password: Option<String>) -> Self {
        self.upload_password = password.filter(|p| !p.is_empty());
        self
    }
}

pub fn build_router(state: GatewayState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/ocr", post(ocr_api::run_ocr))
        .route("/api/structure-bill", post(text_api::structure_bill))
        .route("/api/clean-note", post(text_api::clean_note))
        .route("/api/ask-ai", post(chat_api::ask_ai))
        .route("/api/campaigns", get(campaigns_api::list_campaigns))
        .route("/api/campaigns/:id", get(campaigns_api::get_campaign))
        .route("/api/upload-gate", post(upload_gate::check_upload_gate))
        .route("/api/health", get(health_api::get_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Starts the HTTP server and runs until Ctrl-C.
#[instrument(skip(state))]
pub async fn start_server(addr: SocketAddr, state: GatewayState, request_timeout: Duration) -> Result<()> {
    let app = build_router(state, request_timeout);

    info!("Gateway HTTP server listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crowdhealth_core::{NewCampaign, NewMedicalBill, StructuredBillRecord};
    use crowdhealth_inference::MockGateway;
    use crowdhealth_store::InMemoryBillStore;
    use crowdhealth_understanding::encode_data_url;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];
    const BILL_TEXT: &str = "Total: $450.00\nPatient: Jane Doe";
    const BILL_JSON: &str = r#"{ "patient_name": "Jane Doe", "total_amount": 450, "items": [] }"#;

    fn app(gateway: MockGateway) -> (Router, Arc<InMemoryBillStore>) {
        let store = Arc::new(InMemoryBillStore::new());
        let state = GatewayState::new(Arc::new(gateway), store.clone())
            .with_upload_password(Some("letmein".into()));
        (build_router(state, Duration::from_secs(5)), store)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    async fn seed_campaign(store: &InMemoryBillStore, reason: Option<&str>) -> String {
        let bill = store
            .insert_bill(NewMedicalBill {
                raw_ocr_text: BILL_TEXT.into(),
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
        campaign.id.to_string()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _) = app(MockGateway::new());
        let (status, body) = send_json(app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "crowdhealth");
    }

    #[tokio::test]
    async fn ocr_runs_the_whole_pipeline() {
        let (app, store) = app(MockGateway::new().with_ocr_text(BILL_TEXT).with_llm_text(BILL_JSON));
        let request = post_json(
            "/api/ocr",
            json!({ "image": encode_data_url(PNG, "image/png"), "reason": "  Knee surgery " }),
        );

        let (status, body) = send_json(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], BILL_TEXT);
        assert_eq!(body["structured"]["patient_name"], "Jane Doe");
        assert_eq!(body["meta"]["reason"], "Knee surgery");
        assert_eq!(body["saved"]["id"], store.bills()[0].id.to_string());
        assert_eq!(body["saved"]["campaignId"], store.campaigns()[0].id.to_string());
        assert!(body.get("warnings").is_none());
    }

    #[tokio::test]
    async fn ocr_structuring_failure_is_still_a_success() {
        let (app, _) = app(MockGateway::new().with_ocr_text(BILL_TEXT).with_llm_text("no json here"));
        let request = post_json("/api/ocr", json!({ "image": encode_data_url(PNG, "image/png") }));

        let (status, body) = send_json(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], BILL_TEXT);
        assert_eq!(body["structured"], Value::Null);
        assert_eq!(body["saved"], Value::Null);
        assert_eq!(body["warnings"][0]["stage"], "structure");
    }

    #[tokio::test]
    async fn ocr_errors_map_to_status_codes() {
        let (app_missing, _) = app(MockGateway::new());
        let (status, body) = send_json(app_missing, post_json("/api/ocr", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Image is required");

        let (app_failing, store) = app(MockGateway::new().with_ocr_failure("model unavailable"));
        let request = post_json("/api/ocr", json!({ "image": encode_data_url(PNG, "image/png") }));
        let (status, body) = send_json(app_failing, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "model unavailable" }));
        assert!(store.bills().is_empty());

        let (app_unconfigured, _) = app(MockGateway::new().unconfigured());
        let request = post_json("/api/ocr", json!({ "image": encode_data_url(PNG, "image/png") }));
        let (status, _) = send_json(app_unconfigured, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let (app, _) = app(MockGateway::new());
        let request = Request::builder()
            .method("POST")
            .uri("/api/ocr")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send_json(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn structure_bill_endpoint() {
        let (app_ok, _) = app(MockGateway::new().with_llm_text(format!("```json\n{BILL_JSON}\n```")));
        let (status, body) = send_json(app_ok, post_json("/api/structure-bill", json!({ "ocrText": BILL_TEXT }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["structured"]["total_amount"], 450);

        let (app_empty, _) = app(MockGateway::new());
        let (status, body) = send_json(app_empty, post_json("/api/structure-bill", json!({ "ocrText": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "OCR text is required");

        let (app_bad, _) = app(MockGateway::new().with_llm_text("Sorry"));
        let (status, body) = send_json(app_bad, post_json("/api/structure-bill", json!({ "ocrText": BILL_TEXT }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to parse structured data from AI model");
    }

    #[tokio::test]
    async fn clean_note_endpoint() {
        let (app, _) = app(MockGateway::new().with_llm_text("  Poured footings on the north side.  "));
        let (status, body) = send_json(app, post_json("/api/clean-note", json!({ "text": "pourd footngs N side" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleaned"], "Poured footings on the north side.");
    }

    #[tokio::test]
    async fn ask_ai_streams_events_until_done() {
        let gateway = MockGateway::new().with_llm_output(crowdhealth_core::ModelOutput::Chunks(vec![
            "Goal Amount: ".into(),
            "$450.00".into(),
        ]));
        let (app, store) = app(gateway);
        let id = seed_campaign(&store, None).await;

        let response = app
            .oneshot(post_json("/api/ask-ai", json!({ "campaignId": id, "query": "What is the goal?" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(
            body,
            "data: {\"text\":\"Goal Amount: \"}\n\ndata: {\"text\":\"$450.00\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn ask_ai_mid_stream_failure_ends_with_error_then_done() {
        let gateway = MockGateway::new()
            .with_llm_output(crowdhealth_core::ModelOutput::Chunks(vec!["Goal".into(), " Amount".into()]))
            .failing_stream_after(1);
        let (app, store) = app(gateway);
        let id = seed_campaign(&store, None).await;

        let (status, body) = send(app, post_json("/api/ask-ai", json!({ "campaignId": id, "query": "Goal?" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.ends_with("data: {\"error\":\"Failed to get AI response\"}\n\ndata: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn ask_ai_rejects_before_streaming() {
        let (app_missing, _) = app(MockGateway::new());
        let (status, body) = send_json(app_missing, post_json("/api/ask-ai", json!({ "query": "Who?" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Campaign ID and query are required");

        let (app_unknown, _) = app(MockGateway::new());
        let request = post_json("/api/ask-ai", json!({ "campaignId": uuid::Uuid::new_v4(), "query": "Who?" }));
        let (status, body) = send_json(app_unknown, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Campaign not found");
    }

    #[tokio::test]
    async fn ask_ai_without_credential_is_a_server_error() {
        let (app, store) = app(MockGateway::new().unconfigured());
        let id = seed_campaign(&store, None).await;

        let (status, body) = send_json(app, post_json("/api/ask-ai", json!({ "campaignId": id, "query": "Goal?" }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "mock provider has no credential" }));
    }

    #[tokio::test]
    async fn campaigns_are_listed_and_fetched() {
        let (app, store) = app(MockGateway::new());
        let id = seed_campaign(&store, Some("Knee surgery")).await;

        let (status, body) = send_json(app.clone(), get("/api/campaigns?funded=false")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["campaigns"][0]["id"], id);
        assert_eq!(body["campaigns"][0]["medical_bills"]["patient_name"], "Jane Doe");

        let (_, body) = send_json(app.clone(), get("/api/campaigns?funded=true")).await;
        assert_eq!(body["campaigns"], json!([]));

        let (status, body) = send_json(app.clone(), get(&format!("/api/campaigns/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reason"], "Knee surgery");
        assert_eq!(body["goal_amount"], 450.0);

        let (status, _) = send_json(app.clone(), get("/api/campaigns/not-a-uuid")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send_json(app, get("/api/campaigns?funded=maybe")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid query string"));
    }

    #[tokio::test]
    async fn upload_gate_checks_password() {
        let (app_gated, _) = app(MockGateway::new());
        let (status, body) = send_json(app_gated.clone(), post_json("/api/upload-gate", json!({ "password": "letmein" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let (status, body) = send_json(app_gated, post_json("/api/upload-gate", json!({ "password": "nope" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Incorrect password");

        let open = GatewayState::new(Arc::new(MockGateway::new()), Arc::new(InMemoryBillStore::new()));
        let app_open = build_router(open, Duration::from_secs(5));
        let (status, _) = send_json(app_open, post_json("/api/upload-gate", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
    }
}
