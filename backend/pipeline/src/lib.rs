//! Request orchestration: the bill pipeline and the grounded chat responder.

pub mod chat;
pub mod orchestrator;
pub mod system_prompt;

pub use chat::{ChatRequest, GroundedChat, CHAT_FAILURE_MESSAGE};
pub use orchestrator::{BillPipeline, PipelineInput, PipelineMeta, PipelineOutput, StageWarning};
pub use system_prompt::{PromptBuilder, ESCAPE_PHRASE, NOT_IN_DATABASE};
