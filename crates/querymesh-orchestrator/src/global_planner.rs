//! Global Planner node (spec §4.9 step 4): an LLM-backed emission of the
//! execution DAG over sub-queries and combine/post-combine ops. Output
//! schemas are mandatory on every node; the orchestrator (not the model)
//! computes the layered topological order via [`crate::dag::ExecutionDag`].

use crate::dag::ExecutionDag;
use async_trait::async_trait;
use querymesh_agents::{ChatMessage, ChatRole, ExecutionDagDraft, LlmClient, StructuredAgent};
use querymesh_core::{ErrorCode, GraphState, Node, PipelineError, Result, Severity};
use std::sync::Arc;

pub struct GlobalPlanner {
    client: Arc<dyn LlmClient>,
}

impl GlobalPlanner {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn build_prompt(&self, decomposition: &serde_json::Value) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: ChatRole::System,
                content: "You place sub-queries and combine/post-combine ops into an execution DAG. \
                          Every scan node corresponds to one sub-query and has no inputs. Every other \
                          node declares its inputs and a non-empty output_schema. Respond with a \
                          single JSON ExecutionDagDraft object: {nodes: [{id, kind, inputs, output_schema}]}."
                    .to_string(),
            },
            ChatMessage { role: ChatRole::User, content: decomposition.to_string() },
        ]
    }
}

#[async_trait]
impl Node<GraphState> for GlobalPlanner {
    async fn execute(&self, state: &GraphState) -> Result<GraphState> {
        let mut delta = GraphState::default();

        let decomposition = state
            .node_responses
            .get("decomposer")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let agent: StructuredAgent<ExecutionDagDraft> = StructuredAgent::new(self.client.as_ref(), "global_planner");
        let draft = match agent.invoke(self.build_prompt(&decomposition)).await {
            Ok(draft) => draft,
            Err(source) => {
                let error = PipelineError::new(
                    self.name(),
                    "the global planner failed to produce a usable execution DAG",
                    Severity::Error,
                    ErrorCode::PlanningFailure,
                    true,
                )
                .with_detail("agent_error", source.to_string());
                delta.push_error(error);
                return Ok(delta);
            }
        };

        let nodes_json = serde_json::to_value(&draft.nodes).unwrap_or_default();
        let dag = match ExecutionDag::build(draft) {
            Ok(dag) => dag,
            Err(source) => {
                let error = PipelineError::new(
                    self.name(),
                    format!("global planner emitted an invalid execution DAG: {source}"),
                    Severity::Error,
                    ErrorCode::PlanningFailure,
                    true,
                );
                delta.push_error(error);
                return Ok(delta);
            }
        };

        delta.node_responses.insert(
            self.name().to_string(),
            serde_json::json!({
                "nodes": nodes_json,
                "layers": dag.layers(),
            }),
        );
        delta.reasoning.push(format!("execution DAG planned across {} layer(s)", dag.layers().len()));
        Ok(delta)
    }

    fn name(&self) -> &str {
        "global_planner"
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

    #[tokio::test]
    async fn a_valid_dag_is_accepted_and_layered() {
        let response = serde_json::json!({
            "nodes": [
                {"id": "sq1", "kind": "scan", "inputs": [], "output_schema": ["name"]},
                {"id": "sq2", "kind": "scan", "inputs": [], "output_schema": ["name"]},
                {"id": "c1", "kind": "combine", "inputs": [
                    {"source": "scan", "id": "sq1"},
                    {"source": "scan", "id": "sq2"},
                ], "output_schema": ["name"]},
            ],
        })
        .to_string();
        let node = GlobalPlanner::new(Arc::new(StaticClient { response }));
        let state = GraphState::new("t", "ten", "q", vec![]);
        let delta = node.execute(&state).await.unwrap();

        assert!(delta.errors.is_empty());
        let out = &delta.node_responses["global_planner"];
        assert_eq!(out["layers"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn an_invalid_dag_is_a_retryable_planning_failure() {
        let response = serde_json::json!({
            "nodes": [
                {"id": "c1", "kind": "combine", "inputs": [
                    {"source": "scan", "id": "missing"},
                ], "output_schema": ["name"]},
            ],
        })
        .to_string();
        let node = GlobalPlanner::new(Arc::new(StaticClient { response }));
        let state = GraphState::new("t", "ten", "q", vec![]);
        let delta = node.execute(&state).await.unwrap();

        assert_eq!(delta.errors.len(), 1);
        assert!(delta.errors[0].retryable);
    }
}
