//! Executor node (spec §4.8 step 6): runs the validated SQL through the
//! interactive sandbox pool and persists the result to the artifact store.

use crate::bridge::{execute_via_adapter, execution_request};
use crate::types::{SubPipelineStage, SubPipelineState, SubPipelineStatus};
use async_trait::async_trait;
use querymesh_adapter::Adapter;
use querymesh_artifacts::{ArtifactStore, WriteMetadata};
use querymesh_core::{ErrorCode, ExecutionLimits, Node, PipelineError, Result, ResultFrame, Severity};
use querymesh_sandbox::{ExecutionMode, Sandbox};
use std::sync::Arc;
use std::time::Duration;

/// Submits validated SQL for real and writes the resulting frame to the
/// artifact store.
pub struct Executor {
    adapter: Arc<dyn Adapter>,
    sandbox: Arc<Sandbox>,
    artifacts: Arc<ArtifactStore>,
    deadline: Duration,
    row_limit: Option<u64>,
    max_bytes: Option<u64>,
}

impl Executor {
    pub fn new(
        adapter: Arc<dyn Adapter>,
        sandbox: Arc<Sandbox>,
        artifacts: Arc<ArtifactStore>,
        deadline: Duration,
        row_limit: Option<u64>,
        max_bytes: Option<u64>,
    ) -> Self {
        Self { adapter, sandbox, artifacts, deadline, row_limit, max_bytes }
    }
}

#[async_trait]
impl Node<SubPipelineState> for Executor {
    async fn execute(&self, state: &SubPipelineState) -> Result<SubPipelineState> {
        let mut delta = SubPipelineState::default();

        let Some(sql) = state.sql.as_ref() else {
            let error = PipelineError::new(self.name(), "no SQL to execute", Severity::Error, ErrorCode::MissingSql, false);
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            delta.stage = SubPipelineStage::Failed;
            delta.status = SubPipelineStatus::Failed;
            return Ok(delta);
        };

        let Some(datasource_id) = state.datasource_id() else {
            let error = PipelineError::new(self.name(), "no datasource to execute against", Severity::Error, ErrorCode::MissingDatasourceId, false);
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            delta.stage = SubPipelineStage::Failed;
            delta.status = SubPipelineStatus::Failed;
            return Ok(delta);
        };

        let limits = ExecutionLimits { row_limit: self.row_limit, max_bytes: self.max_bytes, ..Default::default() };
        let request = execution_request(ExecutionMode::SqlExecution, datasource_id, self.adapter.get_dialect(), sql, limits);
        let adapter = self.adapter.clone();
        let result = self.sandbox.submit(request, self.deadline, move |request| execute_via_adapter(&adapter, request)).await;

        if !result.success {
            let error = PipelineError::new(
                self.name(),
                format!("execution failed: {}", result.error.unwrap_or_default()),
                Severity::Error,
                ErrorCode::ExecutionFailed,
                true,
            )
            .with_datasource(datasource_id.to_string());
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            return Ok(delta);
        }

        let Some(data) = result.data else {
            let error = PipelineError::new(self.name(), "execution reported success with no data", Severity::Error, ErrorCode::ExecutionFailed, true)
                .with_datasource(datasource_id.to_string());
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            return Ok(delta);
        };
        let frame: ResultFrame = match serde_json::from_value(data) {
            Ok(frame) => frame,
            Err(source) => {
                let error = PipelineError::new(self.name(), "execution returned an unparsable frame", Severity::Error, ErrorCode::ExecutionFailed, false)
                    .with_detail("parse_error", source.to_string());
                delta.last_error = Some(error.clone());
                delta.errors.push(error);
                return Ok(delta);
            }
        };

        if let (Some(bytes), Some(ceiling)) = (frame.bytes, self.max_bytes) {
            if bytes > ceiling {
                let error = PipelineError::new(
                    self.name(),
                    format!("result frame of {bytes} bytes exceeds the {ceiling}-byte safeguard"),
                    Severity::Error,
                    ErrorCode::SafeguardViolation,
                    false,
                )
                .with_datasource(datasource_id.to_string());
                delta.last_error = Some(error.clone());
                delta.errors.push(error);
                delta.stage = SubPipelineStage::Failed;
                delta.status = SubPipelineStatus::Failed;
                return Ok(delta);
            }
        }

        let sub_query = state.sub_query.as_ref().expect("checked by datasource_id() above");
        let meta = WriteMetadata {
            tenant_id: state.tenant_id.clone(),
            request_id: state.request_id.clone(),
            subgraph_name: state.subgraph_name.clone(),
            dag_node_id: sub_query.id.clone(),
            schema_version: state.schema_version.clone(),
        };

        match self.artifacts.write_result_frame(&frame, meta).await {
            Ok(artifact_ref) => {
                delta.artifact_ref = Some(artifact_ref);
                delta.stage = SubPipelineStage::Executed;
                delta.status = SubPipelineStatus::Executed;
                delta.reasoning.push("query executed and result persisted".to_string());
                delta.last_error = None;
            }
            Err(source) => {
                let error = PipelineError::new(self.name(), "failed to persist the result frame", Severity::Error, ErrorCode::ExecutionFailed, true)
                    .with_detail("artifact_error", source.to_string())
                    .with_datasource(datasource_id.to_string());
                delta.last_error = Some(error.clone());
                delta.errors.push(error);
            }
        }

        Ok(delta)
    }

    fn name(&self) -> &str {
        "executor"
    }
}
