//! Datasource Resolver node (spec §4.9 step 2): retrieves candidate
//! datasources, intersects with RBAC-allowed datasources, filters out those
//! lacking `SUPPORTS_SQL`, and applies the schema-version mismatch policy to
//! each survivor.

use crate::types::DatasourceRegistry;
use async_trait::async_trait;
use querymesh_core::{GraphState, Node, Result};
use querymesh_rbac::{apply_mismatch_policy, MismatchOutcome, MismatchPolicy, Rbac};
use querymesh_retrieval::RetrievalIndex;
use querymesh_schema::SchemaStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DATASOURCE_K: usize = 10;

/// One datasource the resolver confirmed usable for this request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedDatasource {
    pub datasource_id: String,
    pub schema_version: String,
    pub warning: Option<String>,
}

pub struct DatasourceResolver {
    index: Arc<dyn RetrievalIndex>,
    rbac: Arc<Rbac>,
    registry: Arc<DatasourceRegistry>,
    schema_store: Arc<dyn SchemaStore>,
    mismatch_policy: MismatchPolicy,
}

impl DatasourceResolver {
    pub fn new(
        index: Arc<dyn RetrievalIndex>,
        rbac: Arc<Rbac>,
        registry: Arc<DatasourceRegistry>,
        schema_store: Arc<dyn SchemaStore>,
        mismatch_policy: MismatchPolicy,
    ) -> Self {
        Self { index, rbac, registry, schema_store, mismatch_policy }
    }
}

#[async_trait]
impl Node<GraphState> for DatasourceResolver {
    async fn execute(&self, state: &GraphState) -> Result<GraphState> {
        let mut delta = GraphState::default();

        let candidates = self
            .index
            .retrieve_datasource_candidates(&state.user_query, DATASOURCE_K)
            .await
            .unwrap_or_default();

        let allowed = self.rbac.get_allowed_datasources(&state.user_roles);
        let sql_capable = self.registry.sql_capable_ids();

        let mut resolved = Vec::new();
        let mut allowed_ids = Vec::new();
        let mut unsupported_ids = Vec::new();

        for chunk in candidates {
            let datasource_id = chunk.datasource_id.clone();
            if !allowed.contains(&datasource_id) {
                continue;
            }
            if !sql_capable.contains(&datasource_id) {
                unsupported_ids.push(datasource_id);
                continue;
            }

            let current_version = match self.schema_store.get_latest_version(&datasource_id) {
                Ok(v) => v,
                Err(_) => {
                    unsupported_ids.push(datasource_id);
                    continue;
                }
            };

            match apply_mismatch_policy(self.mismatch_policy, &datasource_id, &chunk.schema_version, &current_version) {
                MismatchOutcome::Use { warning } => {
                    if let Some(warning) = &warning {
                        delta.reasoning.push(warning.clone());
                    }
                    allowed_ids.push(datasource_id.clone());
                    resolved.push(ResolvedDatasource { datasource_id, schema_version: current_version, warning });
                }
                MismatchOutcome::Drop { error } => {
                    delta.reasoning.push(error);
                    unsupported_ids.push(datasource_id);
                }
            }
        }

        allowed_ids.sort();
        allowed_ids.dedup();
        unsupported_ids.sort();
        unsupported_ids.dedup();

        delta.node_responses.insert(
            self.name().to_string(),
            serde_json::json!({
                "resolved_datasources": resolved,
                "allowed_datasource_ids": allowed_ids,
                "unsupported_datasource_ids": unsupported_ids,
            }),
        );
        delta.reasoning.push(format!("resolved {} usable datasource(s)", resolved.len()));
        Ok(delta)
    }

    fn name(&self) -> &str {
        "datasource_resolver"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use querymesh_adapter::{Adapter, Capability};
    use querymesh_core::AdapterRequest;
    use querymesh_rbac::{PolicyConfig, RolePolicy};
    use querymesh_retrieval::{Chunk, ChunkType, DeterministicEmbedder, DiversityPass, InMemoryRetrievalIndex};
    use querymesh_schema::{ColumnContract, InMemorySchemaStore, SchemaContract, SchemaSnapshot, TableContract};
    use std::collections::{HashMap, HashSet};

    struct FakeAdapter {
        id: &'static str,
        sql_capable: bool,
    }

    #[async_trait]
    impl Adapter for FakeAdapter {
        fn datasource_id(&self) -> &str {
            self.id
        }
        fn capabilities(&self) -> HashSet<Capability> {
            if self.sql_capable {
                HashSet::from([Capability::SupportsSql])
            } else {
                HashSet::new()
            }
        }
        async fn connect(&self) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn fetch_schema_snapshot(&self) -> std::result::Result<SchemaSnapshot, String> {
            Err("unused".to_string())
        }
        async fn execute(&self, _request: AdapterRequest) -> querymesh_core::ResultFrame {
            querymesh_core::ResultFrame::success(vec![], vec![])
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

    fn snapshot(datasource_id: &str) -> SchemaSnapshot {
        SchemaSnapshot {
            datasource_id: datasource_id.to_string(),
            contract: SchemaContract {
                tables: vec![(
                    "public.factories".to_string(),
                    TableContract { columns: vec![ColumnContract { name: "name".to_string(), data_type: "text".to_string(), nullable: false, primary_key: false }], foreign_keys: vec![] },
                )],
            },
            metadata: Default::default(),
        }
    }

    async fn index_with_candidate(datasource_id: &str, schema_version: &str) -> Arc<InMemoryRetrievalIndex> {
        let embedder = Arc::new(DeterministicEmbedder::new(8));
        let index = Arc::new(InMemoryRetrievalIndex::new(embedder.clone(), DiversityPass::None));
        let chunk = Chunk::new(
            datasource_id,
            schema_version,
            ChunkType::Datasource,
            None,
            None,
            format!("{datasource_id} overview"),
            embedder.embed_query("overview").await.unwrap(),
        );
        index.refresh_schema_chunks(datasource_id, schema_version, vec![chunk], &[]);
        index
    }

    fn rbac_allowing(datasource_id: &str) -> Arc<Rbac> {
        let mut roles = HashMap::new();
        roles.insert("admin".to_string(), RolePolicy::new("admin", "admin", vec![datasource_id.to_string()], vec![format!("{datasource_id}.*")]).unwrap());
        Arc::new(Rbac::new(PolicyConfig { roles }))
    }

    #[tokio::test]
    async fn resolves_an_allowed_sql_capable_matching_version_datasource() {
        let store = Arc::new(InMemorySchemaStore::new());
        store.register_snapshot(snapshot("manufacturing"), 5).unwrap();
        let version = store.get_latest_version("manufacturing").unwrap();
        let index = index_with_candidate("manufacturing", &version).await;
        let rbac = rbac_allowing("manufacturing");
        let mut registry = DatasourceRegistry::new();
        registry.register(Arc::new(FakeAdapter { id: "manufacturing", sql_capable: true }));

        let node = DatasourceResolver::new(index, rbac, Arc::new(registry), store, MismatchPolicy::Warn);
        let state = GraphState::new("t", "ten", "list factories", vec!["admin".to_string()]);
        let delta = node.execute(&state).await.unwrap();

        let response = &delta.node_responses["datasource_resolver"];
        assert_eq!(response["allowed_datasource_ids"], serde_json::json!(["manufacturing"]));
        assert!(response["unsupported_datasource_ids"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_non_sql_capable_datasource_is_marked_unsupported() {
        let store = Arc::new(InMemorySchemaStore::new());
        store.register_snapshot(snapshot("manufacturing"), 5).unwrap();
        let version = store.get_latest_version("manufacturing").unwrap();
        let index = index_with_candidate("manufacturing", &version).await;
        let rbac = rbac_allowing("manufacturing");
        let mut registry = DatasourceRegistry::new();
        registry.register(Arc::new(FakeAdapter { id: "manufacturing", sql_capable: false }));

        let node = DatasourceResolver::new(index, rbac, Arc::new(registry), store, MismatchPolicy::Warn);
        let state = GraphState::new("t", "ten", "list factories", vec!["admin".to_string()]);
        let delta = node.execute(&state).await.unwrap();

        let response = &delta.node_responses["datasource_resolver"];
        assert_eq!(response["unsupported_datasource_ids"], serde_json::json!(["manufacturing"]));
    }

    #[tokio::test]
    async fn a_datasource_outside_rbac_is_dropped_entirely() {
        let store = Arc::new(InMemorySchemaStore::new());
        store.register_snapshot(snapshot("manufacturing"), 5).unwrap();
        let version = store.get_latest_version("manufacturing").unwrap();
        let index = index_with_candidate("manufacturing", &version).await;
        let rbac = rbac_allowing("other_datasource");
        let mut registry = DatasourceRegistry::new();
        registry.register(Arc::new(FakeAdapter { id: "manufacturing", sql_capable: true }));

        let node = DatasourceResolver::new(index, rbac, Arc::new(registry), store, MismatchPolicy::Warn);
        let state = GraphState::new("t", "ten", "list factories", vec!["admin".to_string()]);
        let delta = node.execute(&state).await.unwrap();

        let response = &delta.node_responses["datasource_resolver"];
        assert!(response["allowed_datasource_ids"].as_array().unwrap().is_empty());
        assert!(response["unsupported_datasource_ids"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fail_policy_drops_a_stale_candidate() {
        let store = Arc::new(InMemorySchemaStore::new());
        store.register_snapshot(snapshot("manufacturing"), 5).unwrap();
        let index = index_with_candidate("manufacturing", "stale-version").await;
        let rbac = rbac_allowing("manufacturing");
        let mut registry = DatasourceRegistry::new();
        registry.register(Arc::new(FakeAdapter { id: "manufacturing", sql_capable: true }));

        let node = DatasourceResolver::new(index, rbac, Arc::new(registry), store, MismatchPolicy::Fail);
        let state = GraphState::new("t", "ten", "list factories", vec!["admin".to_string()]);
        let delta = node.execute(&state).await.unwrap();

        let response = &delta.node_responses["datasource_resolver"];
        assert!(response["allowed_datasource_ids"].as_array().unwrap().is_empty());
        assert_eq!(response["unsupported_datasource_ids"], serde_json::json!(["manufacturing"]));
    }
}
