//! AST Planner node (spec §4.8 step 2): produces a typed [`Plan`] via a
//! structured-output LLM call, seeded with the retrieved schema context and
//! (on retry) the Refiner's feedback packet.

use crate::types::{SubPipelineStage, SubPipelineState};
use async_trait::async_trait;
use querymesh_agents::{ChatMessage, ChatRole, LlmClient, PlanModel, StructuredAgent};
use querymesh_core::{ErrorCode, Node, PipelineError, Result, Severity};
use std::sync::Arc;

/// Drafts a [`PlanModel`] for the held sub-query against the retrieved
/// schema tables.
pub struct AstPlanner {
    client: Arc<dyn LlmClient>,
}

impl AstPlanner {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn build_prompt(&self, state: &SubPipelineState) -> Vec<ChatMessage> {
        let sub_query = state.sub_query.as_ref().expect("checked by caller");
        let schema_text = state
            .schema_tables
            .iter()
            .map(|t| format!("{}({})", t.name, t.columns.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");

        let mut user_content = format!(
            "Intent: {}\nAvailable tables: {}\nRespond with a single JSON Plan object.",
            sub_query.intent, schema_text
        );
        if let Some(last_error) = &state.last_error {
            let feedback = querymesh_agents::build_feedback_packet(
                std::slice::from_ref(last_error),
                state.plan.as_ref(),
            );
            user_content = format!("{feedback}\n\n{user_content}");
        }

        vec![
            ChatMessage { role: ChatRole::System, content: "You are a SQL planning assistant. Output only a Plan JSON object.".to_string() },
            ChatMessage { role: ChatRole::User, content: user_content },
        ]
    }
}

#[async_trait]
impl Node<SubPipelineState> for AstPlanner {
    async fn execute(&self, state: &SubPipelineState) -> Result<SubPipelineState> {
        let mut delta = SubPipelineState::default();

        if state.sub_query.is_none() {
            let error = PipelineError::new(self.name(), "sub-query missing at planning", Severity::Error, ErrorCode::InvalidState, false);
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            return Ok(delta);
        }

        let messages = self.build_prompt(state);
        let agent: StructuredAgent<PlanModel> = StructuredAgent::new(self.client.as_ref(), "ast_planner");

        let plan = match agent.invoke(messages).await {
            Ok(plan) => plan,
            Err(source) => {
                let error = PipelineError::new(
                    self.name(),
                    "the planner failed to produce a usable plan",
                    Severity::Error,
                    ErrorCode::PlanningFailure,
                    true,
                )
                .with_detail("agent_error", source.to_string());
                delta.last_error = Some(error.clone());
                delta.errors.push(error);
                return Ok(delta);
            }
        };

        if let Err(validation_error) = plan.validate_structure() {
            let error = PipelineError::new(
                self.name(),
                format!("planner produced a structurally invalid plan: {validation_error}"),
                Severity::Error,
                ErrorCode::PlanningFailure,
                true,
            );
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            return Ok(delta);
        }

        delta.plan = Some(plan);
        delta.stage = SubPipelineStage::AstPlanned;
        delta.reasoning.push("plan drafted and structurally valid".to_string());
        delta.last_error = None;
        Ok(delta)
    }

    fn name(&self) -> &str {
        "ast_planner"
    }
}
