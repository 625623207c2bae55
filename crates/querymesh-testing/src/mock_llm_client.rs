//! A configurable [`LlmClient`] double for exercising LLM-backed nodes
//! without a vendor call, grounded in the shape of `dashflow-testing`'s
//! `MockTool`: per-key canned responses, an optional handler, call
//! history, and a fail-next switch.

use async_trait::async_trait;
use querymesh_agents::{AgentError, LlmClient, LlmCompletion, LlmRequest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Handler = Arc<dyn Fn(&LlmRequest) -> Result<String, AgentError> + Send + Sync>;

/// A scripted [`LlmClient`]: responses can be keyed by `agent_name`, fall
/// back to a single default, or be computed by a handler closure.
pub struct MockAgentClient {
    responses: Mutex<HashMap<String, String>>,
    default_response: Mutex<Option<String>>,
    handler: Mutex<Option<Handler>>,
    call_history: Arc<Mutex<Vec<LlmRequest>>>,
    should_fail: Arc<Mutex<bool>>,
    error_message: Mutex<String>,
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            default_response: Mutex::new(None),
            handler: Mutex::new(None),
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
            error_message: Mutex::new("mock llm client error".to_string()),
        }
    }

    /// Registers the JSON (or plain) content returned when `agent_name`
    /// requests a completion.
    pub fn with_response(self, agent_name: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.lock().unwrap().insert(agent_name.into(), response.into());
        self
    }

    /// Registers the content returned for any agent without a specific
    /// response registered.
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *self.default_response.lock().unwrap() = Some(response.into());
        self
    }

    /// Registers a closure computing the response from the request,
    /// checked before the per-agent map and the default.
    pub fn with_handler(self, handler: impl Fn(&LlmRequest) -> Result<String, AgentError> + Send + Sync + 'static) -> Self {
        *self.handler.lock().unwrap() = Some(Arc::new(handler));
        self
    }

    pub fn with_error_message(self, message: impl Into<String>) -> Self {
        *self.error_message.lock().unwrap() = message.into();
        self
    }

    /// Makes the next `complete` call fail with the configured error
    /// message, then resume normal scripted behavior.
    pub fn fail_next(&self) {
        *self.should_fail.lock().unwrap() = true;
    }

    pub fn call_count(&self) -> usize {
        self.call_history.lock().unwrap().len()
    }

    pub fn call_history(&self) -> Vec<LlmRequest> {
        self.call_history.lock().unwrap().clone()
    }

    pub fn was_called_for(&self, agent_name: &str) -> bool {
        self.call_history.lock().unwrap().iter().any(|r| r.agent_name == agent_name)
    }

    pub fn reset(&self) {
        self.call_history.lock().unwrap().clear();
        *self.should_fail.lock().unwrap() = false;
    }
}

impl Default for MockAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockAgentClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmCompletion, AgentError> {
        self.call_history.lock().unwrap().push(request.clone());

        let mut should_fail = self.should_fail.lock().unwrap();
        if *should_fail {
            *should_fail = false;
            return Err(AgentError::CallFailed(self.error_message.lock().unwrap().clone()));
        }
        drop(should_fail);

        if let Some(handler) = self.handler.lock().unwrap().as_ref() {
            let content = handler(&request)?;
            return Ok(LlmCompletion { content, prompt_tokens: None, completion_tokens: None });
        }

        if let Some(content) = self.responses.lock().unwrap().get(&request.agent_name).cloned() {
            return Ok(LlmCompletion { content, prompt_tokens: None, completion_tokens: None });
        }

        if let Some(content) = self.default_response.lock().unwrap().clone() {
            return Ok(LlmCompletion { content, prompt_tokens: None, completion_tokens: None });
        }

        Err(AgentError::EmptyResponse)
    }
}
