//! Answer Synthesizer node (spec §4.9 step 7): an LLM-backed final step
//! that consumes terminal results plus unmapped-subquery explanations and
//! produces the user-visible answer. Per spec §8 "User-visible failure",
//! this node must always produce a response — when every input failed, it
//! falls back to a deterministic `text` summary built from the accumulated
//! `errors` (safe messages only) and `unmapped_subqueries`, bypassing the
//! LLM call entirely.

use async_trait::async_trait;
use querymesh_agents::{AggregatedResponse, AnswerFormat, ChatMessage, ChatRole, LlmClient, StructuredAgent};
use querymesh_core::{GraphState, Node, Result};
use std::sync::Arc;

pub struct AnswerSynthesizer {
    client: Arc<dyn LlmClient>,
}

impl AnswerSynthesizer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn build_prompt(&self, state: &GraphState, terminal_results: &serde_json::Value, unmapped: &[String]) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: ChatRole::System,
                content: "You summarize query results for a business user. Respond with a single \
                          JSON AggregatedResponse object: {summary, format_type, content, warnings}."
                    .to_string(),
            },
            ChatMessage {
                role: ChatRole::User,
                content: format!(
                    "Original question: {}\nTerminal results: {}\nUnmapped sub-queries (datasource unavailable): {}",
                    state.user_query,
                    terminal_results,
                    unmapped.join(", ")
                ),
            },
        ]
    }

    fn fallback_answer(&self, state: &GraphState, unmapped: &[String]) -> AggregatedResponse {
        let mut lines: Vec<String> = state.errors.iter().map(|e| format!("- {}: {}", e.source_node, e.safe_message)).collect();
        if !unmapped.is_empty() {
            lines.push(format!("- unmapped sub-queries (no usable datasource): {}", unmapped.join(", ")));
        }
        let summary = if lines.is_empty() {
            "The query could not be completed and no specific errors were recorded.".to_string()
        } else {
            format!("The query could not be completed:\n{}", lines.join("\n"))
        };
        AggregatedResponse { summary, format_type: AnswerFormat::Text, content: serde_json::json!({}), warnings: Vec::new() }
    }
}

#[async_trait]
impl Node<GraphState> for AnswerSynthesizer {
    async fn execute(&self, state: &GraphState) -> Result<GraphState> {
        let mut delta = GraphState::default();

        let terminal_results = state.node_responses.get("engine_aggregator").cloned().unwrap_or_else(|| serde_json::json!({}));
        let unmapped: Vec<String> = state
            .node_responses
            .get("decomposer")
            .and_then(|v| v.get("unmapped_subqueries"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let has_any_result = terminal_results.as_object().map(|o| !o.is_empty()).unwrap_or(false);

        let answer = if has_any_result {
            let agent: StructuredAgent<AggregatedResponse> = StructuredAgent::new(self.client.as_ref(), "answer_synthesizer");
            match agent.invoke(self.build_prompt(state, &terminal_results, &unmapped)).await {
                Ok(answer) => answer,
                Err(_) => self.fallback_answer(state, &unmapped),
            }
        } else {
            self.fallback_answer(state, &unmapped)
        };

        delta.final_answer = Some(serde_json::to_value(&answer).unwrap_or_default());
        delta.reasoning.push("answer synthesized".to_string());
        Ok(delta)
    }

    fn name(&self) -> &str {
        "answer_synthesizer"
    }
}
