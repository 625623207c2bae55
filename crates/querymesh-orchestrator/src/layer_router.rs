//! Layer Router (spec §4.9 step 5): finds the next layer of scan nodes
//! with missing `ArtifactRef`s and fans each out to a sub-pipeline
//! instance selected by its datasource's capability set. Scheduling is
//! parallel within a layer, sequential across layers.
//!
//! Built directly on `tokio::task::JoinSet` rather than
//! `querymesh_core::StateGraph`, per that engine's documented scope split
//! (sequential-with-retry vs. dynamic parallel-by-DAG-layer).

use crate::types::{DatasourceRegistry, SubgraphOutput};
use querymesh_agents::SubQueryDraft;
use querymesh_artifacts::ArtifactStore;
use querymesh_core::ResultFrame;
use querymesh_pipeline::{build_sub_pipeline, AstPlanner, Executor, LogicalValidator, PhysicalValidator, SchemaRetriever, SqlGenerator, SubPipelineState, SubPipelineStatus, SubQuery};
use querymesh_rbac::Rbac;
use querymesh_retrieval::RetrievalIndex;
use querymesh_sandbox::Sandbox;
use querymesh_schema::SchemaStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Everything a sub-pipeline invocation needs that is constant across the
/// whole request: shared collaborators plus the retry/physical-validator
/// tuning the orchestrator was configured with.
pub struct LayerRouter {
    pub index: Arc<dyn RetrievalIndex>,
    pub schema_store: Arc<dyn SchemaStore>,
    pub rbac: Arc<Rbac>,
    pub registry: Arc<DatasourceRegistry>,
    pub artifacts: Arc<ArtifactStore>,
    pub llm_client: Arc<dyn querymesh_agents::LlmClient>,
    pub deadline: Duration,
    pub row_limit: Option<u64>,
    pub max_bytes: Option<u64>,
}

impl LayerRouter {
    /// Runs every scan sub-query in `sub_queries` concurrently and returns
    /// one [`SubgraphOutput`] per sub-query, plus the scan id's materialized
    /// [`ResultFrame`] for every one that reached `executed`.
    pub async fn run_scan_layer(
        &self,
        sub_queries: Vec<SubQueryDraft>,
        user_roles: Vec<String>,
        trace_id: &str,
        tenant_id: &str,
        request_id: &str,
    ) -> (Vec<SubgraphOutput>, HashMap<String, ResultFrame>) {
        let mut joins = JoinSet::new();

        for draft in sub_queries {
            let Some(datasource_id) = draft.datasource_id.clone() else {
                continue;
            };
            let Some(adapter) = self.registry.get(&datasource_id) else {
                continue;
            };

            let sub_query = SubQuery {
                id: draft.id.clone(),
                datasource_id,
                intent: draft.intent,
                metrics: draft.metrics,
                filters: draft.filters,
                group_by: draft.group_by,
                expected_columns: draft.expected_columns,
            };

            let index = self.index.clone();
            let schema_store = self.schema_store.clone();
            let rbac = self.rbac.clone();
            let artifacts = self.artifacts.clone();
            let llm_client = self.llm_client.clone();
            let sandbox = Arc::new(Sandbox::new(Arc::new(querymesh_core::AuditLogger::new(Arc::new(querymesh_core::TracingAuditSink)))));
            let deadline = self.deadline;
            let row_limit = self.row_limit;
            let max_bytes = self.max_bytes;
            let trace_id = trace_id.to_string();
            let tenant_id = tenant_id.to_string();
            let request_id = request_id.to_string();
            let user_roles = user_roles.clone();
            let subgraph_id = format!("sg-{}", sub_query.id);

            joins.spawn(async move {
                let compiled = build_sub_pipeline(
                    SchemaRetriever::new(index, schema_store),
                    AstPlanner::new(llm_client),
                    LogicalValidator::new(rbac),
                    SqlGenerator::new(row_limit),
                    PhysicalValidator::new(adapter.clone(), sandbox.clone(), deadline, row_limit),
                    Executor::new(adapter, sandbox, artifacts, deadline, row_limit, max_bytes),
                );

                let sub_query_for_output = sub_query.clone();
                let result = match compiled {
                    Ok(graph) => {
                        let initial = SubPipelineState::new(sub_query, user_roles, trace_id, tenant_id, request_id, subgraph_id.clone());
                        graph.invoke(initial).await
                    }
                    Err(source) => Err(source),
                };

                match result {
                    Ok(state) => (sub_query_for_output, subgraph_id, state),
                    Err(source) => {
                        let mut state = SubPipelineState::default();
                        state.status = SubPipelineStatus::Failed;
                        state.errors.push(querymesh_core::PipelineError::unknown("layer_router", source.to_string()));
                        (sub_query_for_output, subgraph_id, state)
                    }
                }
            });
        }

        let mut outputs = Vec::new();
        let mut frames = HashMap::new();

        while let Some(joined) = joins.join_next().await {
            let Ok((sub_query, subgraph_id, state)) = joined else {
                continue;
            };

            if let Some(artifact_ref) = &state.artifact_ref {
                if let Ok(frame) = self.artifacts.read_result_frame(artifact_ref).await {
                    frames.insert(sub_query.id.clone(), frame);
                }
            }

            outputs.push(SubgraphOutput {
                sub_query,
                subgraph_id,
                retry_count: state.retry_count,
                plan: state.plan,
                sql_draft: state.sql,
                artifact: state.artifact_ref,
                errors: state.errors,
                reasoning: state.reasoning,
                status: state.status,
            });
        }

        (outputs, frames)
    }
}
