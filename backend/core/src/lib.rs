pub mod error;
pub mod event;
pub mod lenient;
pub mod traits;
pub mod types;

pub use error::{CrowdError, Result};
pub use event::{ChatEvent, DONE_SENTINEL};
pub use traits::{
    InferenceGateway, LanguageModelOptions, LlmRequest, ModelOutput, OcrTask, ReasoningEffort,
    Verbosity,
};
pub use types::{
    CampaignRecord, ChatRole, ChatTurn, CrowdfundingCampaign, LineItem, MedicalBill, NewCampaign,
    NewMedicalBill, SavedBill, StructuredBill, StructuredBillRecord,
};
