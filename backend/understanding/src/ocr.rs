//! Optical Character Recognition (OCR)
//!
//! Hands a decoded image to the inference provider's OCR model.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crowdhealth_core::{InferenceGateway, OcrTask, Result};

use crate::image::DecodedImage;

/// Build the OCR task, falling back to the defaults for absent or blank values.
pub fn resolve_task(task_type: Option<&str>, resolution_size: Option<&str>) -> OcrTask {
    fn pick(value: Option<&str>, default: &str) -> String {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    }
    OcrTask::new(
        pick(task_type, OcrTask::DEFAULT_TASK_TYPE),
        pick(resolution_size, OcrTask::DEFAULT_RESOLUTION),
    )
}

pub struct OcrService {
    gateway: Arc<dyn InferenceGateway>,
}

impl OcrService {
    pub fn new(gateway: Arc<dyn InferenceGateway>) -> Self {
        Self { gateway }
    }

    /// Extract all discernible text from the image. Provider errors pass through unchanged.
    pub async fn extract_text(&self, image: &DecodedImage, task: &OcrTask) -> Result<String> {
        let start = Instant::now();
        info!(
            provider = self.gateway.name(),
            mime = %image.mime,
            size = image.bytes.len(),
            task_type = %task.task_type,
            "Running OCR"
        );
        let text = self.gateway.run_ocr(&image.bytes, task).await?;
        info!(
            chars = text.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "OCR finished"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdhealth_core::CrowdError;
    use crowdhealth_inference::MockGateway;

    fn image() -> DecodedImage {
        DecodedImage {
            mime: "image/png".into(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn blank_task_values_use_defaults() {
        let task = resolve_task(Some("  "), None);
        assert_eq!(task, OcrTask::default());

        let task = resolve_task(Some("Convert to Markdown"), Some("Base"));
        assert_eq!(task.task_type, "Convert to Markdown");
        assert_eq!(task.resolution_size, "Base");
    }

    #[tokio::test]
    async fn passes_image_and_task_to_provider() {
        let gateway = Arc::new(MockGateway::new().with_ocr_text("Total: $450.00"));
        let service = OcrService::new(gateway.clone());

        let text = service.extract_text(&image(), &OcrTask::default()).await.unwrap();
        assert_eq!(text, "Total: $450.00");
        assert_eq!(gateway.ocr_calls(), vec![(3, OcrTask::default())]);
    }

    #[tokio::test]
    async fn provider_failure_is_surfaced_verbatim() {
        let gateway = Arc::new(MockGateway::new().with_ocr_failure("model unavailable"));
        let service = OcrService::new(gateway);

        let err = service.extract_text(&image(), &OcrTask::default()).await.unwrap_err();
        assert!(matches!(err, CrowdError::Provider { ref message, .. } if message == "model unavailable"));
    }
}
