//! Physical Validator node (spec §4.8 step 5): dry-runs the generated SQL
//! when the adapter supports it, and flags an over-budget cost estimate as
//! a non-blocking performance warning.

use crate::bridge::{execute_via_adapter, execution_request};
use crate::types::{SubPipelineStage, SubPipelineState};
use async_trait::async_trait;
use querymesh_adapter::{Adapter, Capability};
use querymesh_core::{ErrorCode, ExecutionLimits, Node, PipelineError, Result, Severity};
use querymesh_sandbox::{ExecutionMode, Sandbox};
use std::sync::Arc;
use std::time::Duration;

/// Submits the candidate SQL through the sandbox in dry-run and/or
/// cost-estimate mode, per whatever the adapter's capability set declares.
pub struct PhysicalValidator {
    adapter: Arc<dyn Adapter>,
    sandbox: Arc<Sandbox>,
    deadline: Duration,
    row_limit: Option<u64>,
}

impl PhysicalValidator {
    pub fn new(adapter: Arc<dyn Adapter>, sandbox: Arc<Sandbox>, deadline: Duration, row_limit: Option<u64>) -> Self {
        Self { adapter, sandbox, deadline, row_limit }
    }

    fn limits(&self) -> ExecutionLimits {
        ExecutionLimits { row_limit: self.row_limit, ..Default::default() }
    }

    async fn submit(&self, mode: ExecutionMode, sql: &str) -> querymesh_sandbox::ExecutionResult {
        let request = execution_request(mode, self.adapter.datasource_id(), self.adapter.get_dialect(), sql, self.limits());
        let adapter = self.adapter.clone();
        self.sandbox
            .submit(request, self.deadline, move |request| execute_via_adapter(&adapter, request))
            .await
    }
}

#[async_trait]
impl Node<SubPipelineState> for PhysicalValidator {
    async fn execute(&self, state: &SubPipelineState) -> Result<SubPipelineState> {
        let mut delta = SubPipelineState::default();

        let Some(sql) = state.sql.as_ref() else {
            let error = PipelineError::new(self.name(), "sql missing at physical validation", Severity::Error, ErrorCode::InvalidState, false);
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            return Ok(delta);
        };

        let capabilities = self.adapter.capabilities();

        if capabilities.contains(&Capability::SupportsDryRun) {
            let result = self.submit(ExecutionMode::DryRun, sql).await;
            if !result.success {
                let error = PipelineError::new(
                    self.name(),
                    format!("dry run rejected the generated SQL: {}", result.error.unwrap_or_default()),
                    Severity::Error,
                    ErrorCode::PlanningFailure,
                    true,
                )
                .with_datasource(state.datasource_id().unwrap_or_default().to_string());
                delta.last_error = Some(error.clone());
                delta.errors.push(error);
                return Ok(delta);
            }
        }

        if capabilities.contains(&Capability::SupportsCostEstimate) {
            let result = self.submit(ExecutionMode::CostEstimate, sql).await;
            if result.success {
                let estimated_rows = result.metrics.get("estimated_rows").and_then(|v| v.as_u64());
                if let (Some(estimated), Some(ceiling)) = (estimated_rows, self.row_limit) {
                    if estimated > ceiling {
                        delta.errors.push(
                            PipelineError::new(
                                self.name(),
                                format!("estimated row count {estimated} exceeds the adapter row limit {ceiling}"),
                                Severity::Warning,
                                ErrorCode::PerformanceWarning,
                                false,
                            )
                            .with_datasource(state.datasource_id().unwrap_or_default().to_string()),
                        );
                    }
                }
            }
        }

        delta.stage = SubPipelineStage::PhysicallyValid;
        delta.reasoning.push("SQL passed physical validation".to_string());
        delta.last_error = None;
        Ok(delta)
    }

    fn name(&self) -> &str {
        "physical_validator"
    }
}
