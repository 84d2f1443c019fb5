//! HTTP error mapping. Every failure body is `{"error": "<message>"}`.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crowdhealth_core::CrowdError;
use logging::redact_sensitive_data;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<CrowdError> for ApiError {
    fn from(err: CrowdError) -> Self {
        let status = match &err {
            CrowdError::Validation(_) => StatusCode::BAD_REQUEST,
            CrowdError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match err {
            // The provider's own message goes to the client unchanged.
            CrowdError::Provider { message, .. } => message,
            other => other.to_string(),
        };
        Self { status, message }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let logged = redact_sensitive_data(&self.message);
        if self.status.is_server_error() {
            error!(status = %self.status, error = %logged, "Request failed");
        } else {
            warn!(status = %self.status, error = %logged, "Request rejected");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (CrowdError::validation("Image is required"), StatusCode::BAD_REQUEST),
            (CrowdError::NotFound("Campaign not found".into()), StatusCode::NOT_FOUND),
            (CrowdError::Configuration("REPLICATE_API_TOKEN is not configured".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (CrowdError::Structuring("bad json".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (CrowdError::Persistence("insert failed".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn provider_message_passes_through() {
        let err = ApiError::from(CrowdError::provider("replicate", "Prediction failed: CUDA out of memory"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Prediction failed: CUDA out of memory");
    }

    #[test]
    fn logged_message_hides_tokens() {
        let (logs, _guard) = logging::test_util::CapturedLogs::install();
        let response = ApiError::from(CrowdError::provider(
            "replicate",
            "Unauthenticated token r8_AbCdEfGhIjKlMnOpQrSt",
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let text = logs.text();
        assert!(text.contains("Request failed"), "{text}");
        assert!(text.contains("Unauthenticated token [REDACTED_TOKEN]"), "{text}");
        assert!(!text.contains("r8_AbCdEfGhIjKlMnOpQrSt"), "{text}");
    }
}
