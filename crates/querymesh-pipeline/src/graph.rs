//! Wires the six §4.8 nodes into the per-sub-query state machine:
//! `schema_retrieved → ast_planned → logically_valid → sql_generated →
//! physically_valid → executed`, with every node's retryable failure
//! routed through the retry handler back to the planner until the retry
//! ceiling, and every non-retryable or ceiling-exceeding failure routed to
//! a terminal failure node.

use crate::ast_planner::AstPlanner;
use crate::executor::Executor;
use crate::logical_validator::LogicalValidator;
use crate::physical_validator::PhysicalValidator;
use crate::retry::{RetryHandler, MAX_RETRIES};
use crate::schema_retriever::SchemaRetriever;
use crate::sql_generator::SqlGenerator;
use crate::types::{SubPipelineStage, SubPipelineState, SubPipelineStatus};
use async_trait::async_trait;
use querymesh_core::{Node, Result, StateGraph, END};
use std::sync::Arc;

const SCHEMA_RETRIEVER: &str = "schema_retriever";
const AST_PLANNER: &str = "ast_planner";
const LOGICAL_VALIDATOR: &str = "logical_validator";
const SQL_GENERATOR: &str = "sql_generator";
const PHYSICAL_VALIDATOR: &str = "physical_validator";
const EXECUTOR: &str = "executor";
const RETRY_HANDLER: &str = "retry_handler";
const FAIL_FINALIZER: &str = "fail_finalizer";

/// Sets the terminal `failed` state once a node's error is non-retryable
/// or the retry ceiling has been reached.
struct FailFinalizer;

#[async_trait]
impl Node<SubPipelineState> for FailFinalizer {
    async fn execute(&self, state: &SubPipelineState) -> Result<SubPipelineState> {
        let mut delta = SubPipelineState::default();
        delta.stage = SubPipelineStage::Failed;
        delta.status = SubPipelineStatus::Failed;
        if let Some(error) = &state.last_error {
            delta.reasoning.push(format!("sub-pipeline failed: {}", error.safe_message));
        }
        Ok(delta)
    }

    fn name(&self) -> &str {
        "fail_finalizer"
    }
}

/// Routes after a validating node: a clean delta advances to `next`; a
/// retryable error under the retry ceiling goes to the retry handler;
/// anything else is a terminal failure.
fn route_after(next: &'static str) -> impl Fn(&SubPipelineState) -> String + Send + Sync + 'static {
    move |state: &SubPipelineState| match &state.last_error {
        Some(error) if error.retryable && state.retry_count < MAX_RETRIES => RETRY_HANDLER.to_string(),
        Some(_) => FAIL_FINALIZER.to_string(),
        None => next.to_string(),
    }
}

/// Builds the compiled sub-pipeline graph from its six collaborating
/// nodes.
pub fn build_sub_pipeline(
    schema_retriever: SchemaRetriever,
    ast_planner: AstPlanner,
    logical_validator: LogicalValidator,
    sql_generator: SqlGenerator,
    physical_validator: PhysicalValidator,
    executor: Executor,
) -> Result<querymesh_core::CompiledGraph<SubPipelineState>> {
    let mut graph: StateGraph<SubPipelineState> = StateGraph::new();

    graph.add_node(SCHEMA_RETRIEVER, Arc::new(schema_retriever));
    graph.add_node(AST_PLANNER, Arc::new(ast_planner));
    graph.add_node(LOGICAL_VALIDATOR, Arc::new(logical_validator));
    graph.add_node(SQL_GENERATOR, Arc::new(sql_generator));
    graph.add_node(PHYSICAL_VALIDATOR, Arc::new(physical_validator));
    graph.add_node(EXECUTOR, Arc::new(executor));
    graph.add_node(RETRY_HANDLER, Arc::new(RetryHandler));
    graph.add_node(FAIL_FINALIZER, Arc::new(FailFinalizer));

    graph.add_conditional_edge(SCHEMA_RETRIEVER, route_after(AST_PLANNER));
    graph.add_conditional_edge(AST_PLANNER, route_after(LOGICAL_VALIDATOR));
    graph.add_conditional_edge(LOGICAL_VALIDATOR, route_after(SQL_GENERATOR));
    graph.add_conditional_edge(SQL_GENERATOR, route_after(PHYSICAL_VALIDATOR));
    graph.add_conditional_edge(PHYSICAL_VALIDATOR, route_after(EXECUTOR));
    graph.add_conditional_edge(EXECUTOR, route_after(END));
    graph.add_edge(RETRY_HANDLER, AST_PLANNER);
    graph.add_edge(FAIL_FINALIZER, END);

    graph.set_entry_point(SCHEMA_RETRIEVER)?;
    graph.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubQuery;
    use async_trait::async_trait;
    use querymesh_adapter::{Adapter, Capability};
    use querymesh_agents::{AgentError, LlmClient, LlmCompletion, LlmRequest};
    use querymesh_artifacts::{ArtifactStore, LocalArtifactBackend};
    use querymesh_core::{AdapterRequest, AuditLogger, ColumnSpec, MemoryAuditSink, ResultFrame};
    use querymesh_rbac::{PolicyConfig, RolePolicy, Rbac};
    use querymesh_retrieval::{DeterministicEmbedder, DiversityPass, InMemoryRetrievalIndex};
    use querymesh_sandbox::Sandbox;
    use querymesh_schema::{ColumnContract, InMemorySchemaStore, SchemaContract, SchemaSnapshot, SchemaStore, TableContract};
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    struct StaticClient;

    #[async_trait]
    impl LlmClient for StaticClient {
        async fn complete(&self, _request: LlmRequest) -> std::result::Result<LlmCompletion, AgentError> {
            let plan = serde_json::json!({
                "query_type": "read",
                "tables": [{"name": "public.factories", "alias": "f", "ordinal": 0}],
                "joins": [],
                "select_items": [{"expr": {"kind": "Column", "alias": "f", "name": "name"}, "alias": null, "ordinal": 0}],
            });
            Ok(LlmCompletion { content: plan.to_string(), prompt_tokens: None, completion_tokens: None })
        }
    }

    struct FakeAdapter;

    #[async_trait]
    impl Adapter for FakeAdapter {
        fn datasource_id(&self) -> &str {
            "manufacturing"
        }
        fn capabilities(&self) -> HashSet<Capability> {
            HashSet::from([Capability::SupportsSql])
        }
        async fn connect(&self) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn fetch_schema_snapshot(&self) -> std::result::Result<SchemaSnapshot, String> {
            Err("unused".to_string())
        }
        async fn execute(&self, _request: AdapterRequest) -> ResultFrame {
            ResultFrame::success(vec![ColumnSpec { name: "name".to_string(), data_type: "text".to_string() }], vec![vec![serde_json::json!("acme")]])
        }
        fn get_dialect(&self) -> &str {
            "sqlite"
        }
        async fn test_connection(&self) -> bool {
            true
        }
        fn get_details(&self) -> HashMap<String, String> {
            HashMap::new()
        }
    }

    fn sub_query() -> SubQuery {
        SubQuery {
            id: "sq1".to_string(),
            datasource_id: "manufacturing".to_string(),
            intent: "list factories".to_string(),
            metrics: vec![],
            filters: vec![],
            group_by: vec![],
            expected_columns: vec!["name".to_string()],
        }
    }

    #[tokio::test]
    async fn a_clean_run_reaches_executed_without_retrying() {
        let embedder = Arc::new(DeterministicEmbedder::new(8));
        let index = Arc::new(InMemoryRetrievalIndex::new(embedder, DiversityPass::None));
        let schema_store = Arc::new(InMemorySchemaStore::new());
        schema_store
            .register_snapshot(
                SchemaSnapshot {
                    datasource_id: "manufacturing".to_string(),
                    contract: SchemaContract {
                        tables: vec![(
                            "public.factories".to_string(),
                            TableContract {
                                columns: vec![ColumnContract { name: "name".to_string(), data_type: "text".to_string(), nullable: false, primary_key: false }],
                                foreign_keys: vec![],
                            },
                        )],
                    },
                    metadata: Default::default(),
                },
                5,
            )
            .unwrap();

        let mut roles = HashMap::new();
        roles.insert("admin".to_string(), RolePolicy::new("admin", "admin", vec!["manufacturing".to_string()], vec!["manufacturing.*".to_string()]).unwrap());
        let rbac = Arc::new(Rbac::new(PolicyConfig { roles }));

        let adapter: Arc<dyn Adapter> = Arc::new(FakeAdapter);
        let sandbox = Arc::new(Sandbox::new(Arc::new(AuditLogger::new(Arc::new(MemoryAuditSink::default())))));
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::new(Arc::new(LocalArtifactBackend::new(tmp.path()))));

        let compiled = build_sub_pipeline(
            SchemaRetriever::new(index, schema_store),
            AstPlanner::new(Arc::new(StaticClient)),
            LogicalValidator::new(rbac),
            SqlGenerator::new(Some(100)),
            PhysicalValidator::new(adapter.clone(), sandbox.clone(), Duration::from_secs(5), Some(100)),
            Executor::new(adapter, sandbox, artifacts, Duration::from_secs(5), Some(100), None),
        )
        .unwrap();

        let initial = SubPipelineState::new(sub_query(), vec!["admin".to_string()], "t", "ten", "r", "sg1");
        let result = compiled.invoke(initial).await.unwrap();

        assert_eq!(result.stage, SubPipelineStage::Executed);
        assert_eq!(result.status, SubPipelineStatus::Executed);
        assert_eq!(result.retry_count, 0);
        assert!(result.artifact_ref.is_some());
    }

    #[tokio::test]
    async fn unauthorized_roles_fail_terminally_without_retrying() {
        let embedder = Arc::new(DeterministicEmbedder::new(8));
        let index = Arc::new(InMemoryRetrievalIndex::new(embedder, DiversityPass::None));
        let schema_store = Arc::new(InMemorySchemaStore::new());
        schema_store
            .register_snapshot(
                SchemaSnapshot {
                    datasource_id: "manufacturing".to_string(),
                    contract: SchemaContract {
                        tables: vec![(
                            "public.factories".to_string(),
                            TableContract {
                                columns: vec![ColumnContract { name: "name".to_string(), data_type: "text".to_string(), nullable: false, primary_key: false }],
                                foreign_keys: vec![],
                            },
                        )],
                    },
                    metadata: Default::default(),
                },
                5,
            )
            .unwrap();

        let mut roles = HashMap::new();
        roles.insert("viewer".to_string(), RolePolicy::new("viewer", "viewer", vec!["other_datasource".to_string()], vec!["other_datasource.*".to_string()]).unwrap());
        let rbac = Arc::new(Rbac::new(PolicyConfig { roles }));

        let adapter: Arc<dyn Adapter> = Arc::new(FakeAdapter);
        let sandbox = Arc::new(Sandbox::new(Arc::new(AuditLogger::new(Arc::new(MemoryAuditSink::default())))));
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::new(Arc::new(LocalArtifactBackend::new(tmp.path()))));

        let compiled = build_sub_pipeline(
            SchemaRetriever::new(index, schema_store),
            AstPlanner::new(Arc::new(StaticClient)),
            LogicalValidator::new(rbac),
            SqlGenerator::new(Some(100)),
            PhysicalValidator::new(adapter.clone(), sandbox.clone(), Duration::from_secs(5), Some(100)),
            Executor::new(adapter, sandbox, artifacts, Duration::from_secs(5), Some(100), None),
        )
        .unwrap();

        let initial = SubPipelineState::new(sub_query(), vec!["viewer".to_string()], "t", "ten", "r", "sg1");
        let result = compiled.invoke(initial).await.unwrap();

        assert_eq!(result.stage, SubPipelineStage::Failed);
        assert_eq!(result.status, SubPipelineStatus::Failed);
        assert_eq!(result.retry_count, 0);
    }
}
