//! The LLM call boundary and the structured-output wrapper discipline
//! (spec §4.12): every LLM-backed node refuses to return unparsed content,
//! maps parse failures to an error record, and never passes raw LLM text
//! downstream.
//!
//! Grounded on the teacher's `OpenAIStructuredChatModel<T>`
//! (`dashflow-openai/src/structured.rs`): a generic wrapper around a raw
//! chat call that extracts JSON from the completion and deserializes it
//! into a typed contract, turning any parse failure into a typed error
//! rather than forwarding a string. The concrete vendor client (OpenAI,
//! Anthropic, Bedrock, …) is an external collaborator; only the contract
//! boundary is part of the core (spec §1 "Out of scope").

use crate::error::AgentError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// One chat turn handed to the underlying model.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Who authored a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single completion request, carrying enough context for audit logging
/// and token metrics (spec §4.10, §4.11) without this crate depending on
/// either.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub agent_name: String,
    pub messages: Vec<ChatMessage>,
    pub trace_id: Option<String>,
}

impl LlmRequest {
    pub fn new(agent_name: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self { agent_name: agent_name.into(), messages, trace_id: None }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// A raw completion from the model, before any structured parsing.
#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub content: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

/// The minimal boundary this core consumes from an LLM provider. Concrete
/// implementations (vendor SDK adapters) live outside the core; this crate
/// only depends on the trait.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmCompletion, AgentError>;
}

/// Extracts a JSON payload from `content`, tolerating a fenced ```json
/// code block — models routinely wrap structured output in markdown even
/// when instructed not to (mirrors the teacher's `extract_json` helper).
fn extract_json(content: &str) -> Result<&str, AgentError> {
    let trimmed = content.trim();
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_fence.find("```") {
            return Ok(after_fence[..end].trim());
        }
    }
    if trimmed.is_empty() {
        return Err(AgentError::EmptyResponse);
    }
    Ok(trimmed)
}

/// Wraps an [`LlmClient`] call with the structured-output discipline for
/// one agent: send the prompt, refuse to propagate unparsed text, and
/// deserialize into `T` or fail with a typed [`AgentError`].
pub struct StructuredAgent<'a, T> {
    client: &'a dyn LlmClient,
    agent_name: &'static str,
    _marker: std::marker::PhantomData<T>,
}

impl<'a, T> StructuredAgent<'a, T>
where
    T: DeserializeOwned,
{
    pub fn new(client: &'a dyn LlmClient, agent_name: &'static str) -> Self {
        Self { client, agent_name, _marker: std::marker::PhantomData }
    }

    /// Sends `messages` and parses the completion into `T`. The caller
    /// never sees the raw completion text on either success or failure
    /// path (spec §4.12 "never pass raw LLM text downstream").
    pub async fn invoke(&self, messages: Vec<ChatMessage>) -> Result<T, AgentError> {
        let request = LlmRequest::new(self.agent_name, messages);
        let completion = self.client.complete(request).await?;
        let json = extract_json(&completion.content)?;
        serde_json::from_str(json).map_err(|source| AgentError::ParseFailure {
            agent: self.agent_name.to_string(),
            message: source.to_string(),
        })
    }
}
