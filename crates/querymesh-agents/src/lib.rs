//! Typed request/response contracts for every LLM-backed node, and the
//! structured-output discipline that wraps raw model calls (spec §4.12).

mod client;
mod contracts;
mod error;
mod refiner;

pub use client::{ChatMessage, ChatRole, LlmClient, LlmCompletion, LlmRequest, StructuredAgent};
pub use contracts::{
    AggregatedResponse, AnswerFormat, CombineGroupDraft, DagInput, DagNode, DagNodeKind,
    DecomposerResponse, ExecutionDagDraft, InputSource, IntentValidationResult, PlanModel,
    PostCombineOpDraft, SubQueryDraft, ViolationCategory,
};
pub use error::AgentError;
pub use refiner::build_feedback_packet;
