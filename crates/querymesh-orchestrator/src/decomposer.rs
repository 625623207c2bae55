//! Decomposer node (spec §4.9 step 3): an LLM-backed split of the user
//! query into sub-queries targeting allowed datasources, plus combine
//! groups and post-combine ops. Sub-queries with a missing or unsupported
//! `datasource_id` are moved to `unmapped_subqueries[]` — not an error.

use async_trait::async_trait;
use querymesh_agents::{ChatMessage, ChatRole, DecomposerResponse, LlmClient, StructuredAgent};
use querymesh_core::{ErrorCode, GraphState, Node, PipelineError, Result, Severity};
use std::sync::Arc;

pub struct Decomposer {
    client: Arc<dyn LlmClient>,
}

impl Decomposer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn build_prompt(&self, state: &GraphState, allowed_datasource_ids: &[String]) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: ChatRole::System,
                content: "You split a user's natural-language analytics question into sub-queries, \
                          each targeting exactly one of the allowed datasources, plus any combine \
                          groups and post-combine operators needed to join their results. Respond \
                          with a single JSON DecomposerResponse object."
                    .to_string(),
            },
            ChatMessage {
                role: ChatRole::User,
                content: format!("Allowed datasources: {}\nQuery: {}", allowed_datasource_ids.join(", "), state.user_query),
            },
        ]
    }
}

#[async_trait]
impl Node<GraphState> for Decomposer {
    async fn execute(&self, state: &GraphState) -> Result<GraphState> {
        let mut delta = GraphState::default();

        let allowed_datasource_ids: Vec<String> = state
            .node_responses
            .get("datasource_resolver")
            .and_then(|v| v.get("allowed_datasource_ids"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let agent: StructuredAgent<DecomposerResponse> = StructuredAgent::new(self.client.as_ref(), "decomposer");
        let response = match agent.invoke(self.build_prompt(state, &allowed_datasource_ids)).await {
            Ok(response) => response,
            Err(source) => {
                let error = PipelineError::new(
                    self.name(),
                    "the decomposer failed to produce a usable split",
                    Severity::Error,
                    ErrorCode::PlanningFailure,
                    true,
                )
                .with_detail("agent_error", source.to_string());
                delta.push_error(error);
                return Ok(delta);
            }
        };

        let mut mapped_sub_queries = Vec::new();
        let mut unmapped: Vec<String> = response.unmapped_subqueries.clone();

        for draft in response.sub_queries {
            match draft.datasource_id.as_deref() {
                Some(datasource_id) if allowed_datasource_ids.iter().any(|id| id == datasource_id) => {
                    mapped_sub_queries.push(serde_json::to_value(&draft).unwrap_or_default());
                }
                _ => unmapped.push(draft.id),
            }
        }
        unmapped.sort();
        unmapped.dedup();

        delta.node_responses.insert(
            self.name().to_string(),
            serde_json::json!({
                "sub_queries": mapped_sub_queries,
                "combine_groups": response.combine_groups,
                "post_combine_ops": response.post_combine_ops,
                "unmapped_subqueries": unmapped,
            }),
        );
        delta.reasoning.push(format!(
            "decomposed into {} mapped sub-quer{} and {} unmapped",
            mapped_sub_queries.len(),
            if mapped_sub_queries.len() == 1 { "y" } else { "ies" },
            unmapped.len()
        ));
        Ok(delta)
    }

    fn name(&self) -> &str {
        "decomposer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querymesh_agents::{AgentError, LlmCompletion, LlmRequest};

    struct StaticClient {
        response: String,
    }

    #[async_trait]
    impl LlmClient for StaticClient {
        async fn complete(&self, _request: LlmRequest) -> std::result::Result<LlmCompletion, AgentError> {
            Ok(LlmCompletion { content: self.response.clone(), prompt_tokens: None, completion_tokens: None })
        }
    }

    fn state_with_allowed(allowed: &[&str]) -> GraphState {
        let mut state = GraphState::new("t", "ten", "compare factories to suppliers", vec!["admin".to_string()]);
        state.node_responses.insert(
            "datasource_resolver".to_string(),
            serde_json::json!({"allowed_datasource_ids": allowed, "unsupported_datasource_ids": []}),
        );
        state
    }

    #[tokio::test]
    async fn sub_queries_targeting_allowed_datasources_are_mapped() {
        let response = serde_json::json!({
            "sub_queries": [
                {"id": "sq1", "datasource_id": "manufacturing", "intent": "list factories"},
            ],
            "combine_groups": [],
            "post_combine_ops": [],
            "unmapped_subqueries": [],
        })
        .to_string();
        let node = Decomposer::new(Arc::new(StaticClient { response }));
        let delta = node.execute(&state_with_allowed(&["manufacturing"])).await.unwrap();

        let out = &delta.node_responses["decomposer"];
        assert_eq!(out["sub_queries"].as_array().unwrap().len(), 1);
        assert!(out["unmapped_subqueries"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_sub_query_with_an_unsupported_datasource_is_unmapped_not_an_error() {
        let response = serde_json::json!({
            "sub_queries": [
                {"id": "sq1", "datasource_id": "legacy_warehouse", "intent": "list legacy orders"},
            ],
            "combine_groups": [],
            "post_combine_ops": [],
            "unmapped_subqueries": [],
        })
        .to_string();
        let node = Decomposer::new(Arc::new(StaticClient { response }));
        let delta = node.execute(&state_with_allowed(&["manufacturing"])).await.unwrap();

        let out = &delta.node_responses["decomposer"];
        assert!(out["sub_queries"].as_array().unwrap().is_empty());
        assert_eq!(out["unmapped_subqueries"], serde_json::json!(["sq1"]));
        assert!(delta.errors.is_empty());
    }

    #[tokio::test]
    async fn a_sub_query_with_no_datasource_id_is_unmapped() {
        let response = serde_json::json!({
            "sub_queries": [{"id": "sq1", "intent": "ambiguous request"}],
        })
        .to_string();
        let node = Decomposer::new(Arc::new(StaticClient { response }));
        let delta = node.execute(&state_with_allowed(&["manufacturing"])).await.unwrap();

        let out = &delta.node_responses["decomposer"];
        assert_eq!(out["unmapped_subqueries"], serde_json::json!(["sq1"]));
    }
}
