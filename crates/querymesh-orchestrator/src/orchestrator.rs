//! Top-level orchestrator (spec §4.9): wires the sequential gate/plan
//! prefix (Intent Validator → Datasource Resolver → Decomposer → Global
//! Planner) through [`querymesh_core::StateGraph`], then hands off to the
//! Layer Router / Engine Aggregator / Answer Synthesizer for the DAG-shaped
//! remainder. The prefix is linear with one conditional edge: a critical
//! Intent Validator error short-circuits straight past the remaining
//! prefix nodes, matching spec §4.9's "unsafe classification short-circuits
//! to synthesis" rule. Because layer 0 of a validated DAG is always exactly
//! the scan nodes (`crate::dag::ExecutionDag`'s invariant), there is only
//! ever one scan layer to route through tokio::task::JoinSet before the
//! Engine Aggregator walks the remaining layers in-process.

use crate::dag::ExecutionDag;
use crate::datasource_resolver::DatasourceResolver;
use crate::decomposer::Decomposer;
use crate::engine_aggregator::EngineAggregator;
use crate::global_planner::GlobalPlanner;
use crate::intent_validator::IntentValidator;
use crate::layer_router::LayerRouter;
use crate::answer_synthesizer::AnswerSynthesizer;
use crate::types::DatasourceRegistry;
use querymesh_agents::{ExecutionDagDraft, LlmClient, SubQueryDraft};
use querymesh_artifacts::ArtifactStore;
use querymesh_core::{CompiledGraph, Error, GraphState, MergeableState, Result, StateGraph, END};
use querymesh_rbac::{MismatchPolicy, Rbac};
use querymesh_retrieval::RetrievalIndex;
use querymesh_schema::SchemaStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Everything the orchestrator needs to run one request end to end.
pub struct Orchestrator {
    prefix: CompiledGraph<GraphState>,
    layer_router: LayerRouter,
    engine_aggregator: EngineAggregator,
    answer_synthesizer: AnswerSynthesizer,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm_client: Arc<dyn LlmClient>,
        index: Arc<dyn RetrievalIndex>,
        rbac: Arc<Rbac>,
        registry: Arc<DatasourceRegistry>,
        schema_store: Arc<dyn SchemaStore>,
        mismatch_policy: MismatchPolicy,
        artifacts: Arc<ArtifactStore>,
        deadline: Duration,
        row_limit: Option<u64>,
        max_bytes: Option<u64>,
    ) -> Result<Self> {
        let mut graph: StateGraph<GraphState> = StateGraph::new();
        graph.add_node("intent_validator", Arc::new(IntentValidator::new(llm_client.clone())));
        graph.add_node(
            "datasource_resolver",
            Arc::new(DatasourceResolver::new(index.clone(), rbac.clone(), registry.clone(), schema_store.clone(), mismatch_policy)),
        );
        graph.add_node("decomposer", Arc::new(Decomposer::new(llm_client.clone())));
        graph.add_node("global_planner", Arc::new(GlobalPlanner::new(llm_client.clone())));

        graph.add_conditional_edge("intent_validator", |s: &GraphState| {
            if s.has_critical_error() { END.to_string() } else { "datasource_resolver".to_string() }
        });
        graph.add_edge("datasource_resolver", "decomposer");
        graph.add_edge("decomposer", "global_planner");
        graph.add_edge("global_planner", END);
        graph.set_entry_point("intent_validator")?;
        let prefix = graph.compile()?;

        let layer_router = LayerRouter {
            index,
            schema_store,
            rbac,
            registry,
            artifacts: artifacts.clone(),
            llm_client: llm_client.clone(),
            deadline,
            row_limit,
            max_bytes,
        };
        let engine_aggregator = EngineAggregator::new(artifacts);
        let answer_synthesizer = AnswerSynthesizer::new(llm_client);

        Ok(Self { prefix, layer_router, engine_aggregator, answer_synthesizer })
    }

    /// Runs one request end to end, always returning a state with
    /// `final_answer` set (the Answer Synthesizer's guarantee).
    pub async fn run(
        &self,
        trace_id: &str,
        tenant_id: &str,
        request_id: &str,
        user_query: impl Into<String>,
        user_roles: Vec<String>,
    ) -> Result<GraphState> {
        let initial = GraphState::new(trace_id, tenant_id, user_query, user_roles.clone());
        let mut state = self.prefix.invoke(initial).await?;

        if !state.has_critical_error() {
            self.run_dag(&mut state, user_roles, trace_id, tenant_id, request_id).await?;
        }

        let answer_delta = querymesh_core::Node::execute(&self.answer_synthesizer, &state).await?;
        state.merge(&answer_delta);
        Ok(state)
    }

    async fn run_dag(
        &self,
        state: &mut GraphState,
        user_roles: Vec<String>,
        trace_id: &str,
        tenant_id: &str,
        request_id: &str,
    ) -> Result<()> {
        let Some(planner_output) = state.node_responses.get("global_planner").cloned() else {
            return Ok(());
        };
        let nodes: Vec<querymesh_agents::DagNode> = planner_output
            .get("nodes")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        if nodes.is_empty() {
            return Ok(());
        }
        let dag = ExecutionDag::build(ExecutionDagDraft { nodes }).map_err(|source| Error::Other(source.to_string()))?;

        let mapped_sub_queries: Vec<SubQueryDraft> = state
            .node_responses
            .get("decomposer")
            .and_then(|v| v.get("sub_queries"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let mut by_id: HashMap<String, SubQueryDraft> = mapped_sub_queries.into_iter().map(|d| (d.id.clone(), d)).collect();

        let scan_drafts: Vec<SubQueryDraft> = dag.scan_ids().iter().filter_map(|id| by_id.remove(id)).collect();
        if scan_drafts.is_empty() {
            return Ok(());
        }

        let (outputs, scan_frames) = self.layer_router.run_scan_layer(scan_drafts, user_roles, trace_id, tenant_id, request_id).await;
        for output in outputs {
            for error in &output.errors {
                state.errors.push(error.clone());
            }
            state.subgraph_outputs.insert(output.sub_query.id.clone(), serde_json::to_value(&output).unwrap_or_default());
        }

        let materialized = match self.engine_aggregator.run(&dag, &scan_frames).await {
            Ok(materialized) => materialized,
            Err(source) => {
                state.push_error(querymesh_core::PipelineError::new(
                    "engine_aggregator",
                    "failed to combine sub-query results",
                    querymesh_core::Severity::Error,
                    querymesh_core::ErrorCode::AggregatorFailed,
                    false,
                ).with_detail("error", source.to_string()));
                return Ok(());
            }
        };

        let referenced: std::collections::HashSet<&String> =
            dag.layers().iter().flatten().filter_map(|id| dag.node(id)).flat_map(|n| n.inputs.iter().map(|i| &i.id)).collect();
        let terminal_results: serde_json::Value = materialized
            .iter()
            .filter(|(id, _)| !referenced.contains(id))
            .map(|(id, relation)| (id.clone(), serde_json::json!({"columns": relation.columns, "rows": relation.rows})))
            .collect();

        state.node_responses.insert("engine_aggregator".to_string(), terminal_results);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use querymesh_adapter::{Adapter, Capability};
    use querymesh_agents::{AgentError, ChatRole, LlmCompletion, LlmRequest};
    use querymesh_artifacts::LocalArtifactBackend;
    use querymesh_core::{AdapterRequest, ColumnSpec, ResultFrame};
    use querymesh_rbac::{PolicyConfig, RolePolicy};
    use querymesh_retrieval::{Chunk, ChunkType, DeterministicEmbedder, DiversityPass, InMemoryRetrievalIndex};
    use querymesh_schema::{ColumnContract, InMemorySchemaStore, SchemaContract, SchemaSnapshot, TableContract};
    use std::collections::HashSet;

    struct ScriptedClient;

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, request: LlmRequest) -> std::result::Result<LlmCompletion, AgentError> {
            let last_user = request.messages.iter().rev().find(|m| m.role == ChatRole::User).map(|m| m.content.clone()).unwrap_or_default();
            let content = if request.agent_name == "intent_validator" {
                serde_json::json!({"is_safe": true, "violation_category": null, "reasoning": "benign"}).to_string()
            } else if request.agent_name == "decomposer" {
                serde_json::json!({
                    "sub_queries": [{"id": "sq1", "datasource_id": "manufacturing", "intent": "list factories", "expected_columns": ["name"]}],
                    "combine_groups": [], "post_combine_ops": [], "unmapped_subqueries": [],
                })
                .to_string()
            } else if request.agent_name == "global_planner" {
                serde_json::json!({"nodes": [{"id": "sq1", "kind": "scan", "inputs": [], "output_schema": ["name"]}]}).to_string()
            } else if request.agent_name == "ast_planner" {
                serde_json::json!({
                    "query_type": "read",
                    "tables": [{"name": "public.factories", "alias": "f", "ordinal": 0}],
                    "joins": [],
                    "select_items": [{"expr": {"kind": "Column", "alias": "f", "name": "name"}, "alias": null, "ordinal": 0}],
                })
                .to_string()
            } else {
                serde_json::json!({"summary": format!("answered: {last_user}"), "format_type": "table", "content": {}, "warnings": []}).to_string()
            };
            Ok(LlmCompletion { content, prompt_tokens: None, completion_tokens: None })
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

    fn schema_snapshot() -> SchemaSnapshot {
        SchemaSnapshot {
            datasource_id: "manufacturing".to_string(),
            contract: SchemaContract {
                tables: vec![(
                    "public.factories".to_string(),
                    TableContract { columns: vec![ColumnContract { name: "name".to_string(), data_type: "text".to_string(), nullable: false, primary_key: false }], foreign_keys: vec![] },
                )],
            },
            metadata: Default::default(),
        }
    }

    async fn build_orchestrator() -> Orchestrator {
        let embedder = Arc::new(DeterministicEmbedder::new(8));
        let index: Arc<dyn RetrievalIndex> = Arc::new(InMemoryRetrievalIndex::new(embedder.clone(), DiversityPass::None));
        let schema_store: Arc<dyn SchemaStore> = Arc::new(InMemorySchemaStore::new());
        schema_store.register_snapshot(schema_snapshot(), 5).unwrap();
        let version = schema_store.get_latest_version("manufacturing").unwrap();
        let chunk = Chunk::new(
            "manufacturing",
            &version,
            ChunkType::Datasource,
            None,
            None,
            "manufacturing overview".to_string(),
            embedder.embed_query("overview").await.unwrap(),
        );
        index.refresh_schema_chunks("manufacturing", &version, vec![chunk], &[]);

        let mut roles = HashMap::new();
        roles.insert("admin".to_string(), RolePolicy::new("admin", "admin", vec!["manufacturing".to_string()], vec!["manufacturing.*".to_string()]).unwrap());
        let rbac = Arc::new(Rbac::new(PolicyConfig { roles }));

        let mut registry = DatasourceRegistry::new();
        registry.register(Arc::new(FakeAdapter));

        let tmp = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::new(Arc::new(LocalArtifactBackend::new(tmp.path()))));

        Orchestrator::new(
            Arc::new(ScriptedClient),
            index,
            rbac,
            Arc::new(registry),
            schema_store,
            MismatchPolicy::Warn,
            artifacts,
            Duration::from_secs(5),
            Some(1000),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn a_full_request_resolves_decomposes_plans_scans_and_synthesizes_an_answer() {
        let orchestrator = build_orchestrator().await;
        let state = orchestrator
            .run("trace-1", "tenant-1", "req-1", "list factories", vec!["admin".to_string()])
            .await
            .unwrap();

        assert!(!state.has_critical_error());
        let answer = state.final_answer.unwrap();
        assert_eq!(answer["format_type"], "table");
        assert_eq!(state.subgraph_outputs.len(), 1);
    }

    #[tokio::test]
    async fn an_unsafe_query_short_circuits_straight_to_a_synthesized_refusal() {
        struct RefusingClient;
        #[async_trait]
        impl LlmClient for RefusingClient {
            async fn complete(&self, request: LlmRequest) -> std::result::Result<LlmCompletion, AgentError> {
                let content = if request.agent_name == "intent_validator" {
                    serde_json::json!({"is_safe": false, "violation_category": "destructive", "reasoning": "asked to drop a table"}).to_string()
                } else {
                    serde_json::json!({"summary": "cannot help with that request", "format_type": "text", "content": {}, "warnings": []}).to_string()
                };
                Ok(LlmCompletion { content, prompt_tokens: None, completion_tokens: None })
            }
        }

        let embedder = Arc::new(DeterministicEmbedder::new(8));
        let index: Arc<dyn RetrievalIndex> = Arc::new(InMemoryRetrievalIndex::new(embedder, DiversityPass::None));
        let schema_store: Arc<dyn SchemaStore> = Arc::new(InMemorySchemaStore::new());
        let rbac = Arc::new(Rbac::new(PolicyConfig { roles: HashMap::new() }));
        let registry = Arc::new(DatasourceRegistry::new());
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::new(Arc::new(LocalArtifactBackend::new(tmp.path()))));

        let orchestrator = Orchestrator::new(
            Arc::new(RefusingClient),
            index,
            rbac,
            registry,
            schema_store,
            MismatchPolicy::Warn,
            artifacts,
            Duration::from_secs(5),
            Some(1000),
            None,
        )
        .unwrap();

        let state = orchestrator.run("trace-1", "tenant-1", "req-1", "drop the factories table", vec!["admin".to_string()]).await.unwrap();

        assert!(state.has_critical_error());
        assert!(state.node_responses.get("datasource_resolver").is_none());
        let answer = state.final_answer.unwrap();
        assert_eq!(answer["format_type"], "text");
    }
}
