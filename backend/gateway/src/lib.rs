//! CrowdHealth HTTP API
//!
//! OCR pipeline, bill structuring, note clean-up, grounded campaign chat over
//! server-sent events, and read-only campaign listing.

pub mod campaigns_api;
pub mod chat_api;
pub mod error;
pub mod health_api;
pub mod ocr_api;
pub mod server;
pub mod text_api;
pub mod upload_gate;

pub use error::ApiError;
pub use server::{build_router, start_server, GatewayState};
