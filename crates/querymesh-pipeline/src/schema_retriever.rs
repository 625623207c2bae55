//! Schema Retriever node (spec §4.8 step 1): gathers the top-k tables and
//! then the columns/relationships restricted to those tables, falling back
//! to the full schema snapshot when retrieval yields nothing.

use crate::types::{RetrievedTable, SubPipelineState};
use async_trait::async_trait;
use querymesh_core::{ErrorCode, Node, PipelineError, Result, Severity};
use querymesh_retrieval::{ChunkType, RetrievalIndex};
use querymesh_schema::SchemaStore;
use std::sync::Arc;

const TABLE_K: usize = 8;
const COLUMN_K: usize = 40;

/// Retrieves planner-shaped schema context for a sub-query's datasource.
pub struct SchemaRetriever {
    index: Arc<dyn RetrievalIndex>,
    schema_store: Arc<dyn SchemaStore>,
}

impl SchemaRetriever {
    pub fn new(index: Arc<dyn RetrievalIndex>, schema_store: Arc<dyn SchemaStore>) -> Self {
        Self { index, schema_store }
    }

    /// Falls back to the full structural contract when retrieval returns no
    /// chunks (spec §4.8 step 1 "falls back to the full schema snapshot").
    fn fallback_tables(&self, datasource_id: &str) -> Vec<RetrievedTable> {
        let version = match self.schema_store.get_latest_version(datasource_id) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };
        let snapshot = match self.schema_store.get_snapshot(datasource_id, &version) {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };
        snapshot
            .contract
            .tables
            .into_iter()
            .map(|(name, contract)| RetrievedTable {
                name,
                columns: contract.columns.into_iter().map(|c| c.name).collect(),
            })
            .collect()
    }
}

#[async_trait]
impl Node<SubPipelineState> for SchemaRetriever {
    async fn execute(&self, state: &SubPipelineState) -> Result<SubPipelineState> {
        let mut delta = SubPipelineState::default();

        let Some(sub_query) = state.sub_query.as_ref() else {
            delta.last_error = Some(PipelineError::new(
                self.name(),
                "sub-query missing at schema retrieval",
                Severity::Error,
                ErrorCode::InvalidState,
                false,
            ));
            delta.stage = crate::types::SubPipelineStage::Failed;
            delta.status = crate::types::SubPipelineStatus::Failed;
            delta.errors.push(delta.last_error.clone().unwrap());
            return Ok(delta);
        };

        let table_chunks = self
            .index
            .retrieve_schema_context(&sub_query.intent, &sub_query.datasource_id, TABLE_K)
            .await;

        let tables = match table_chunks {
            Ok(chunks) if !chunks.is_empty() => {
                let table_names: Vec<String> = chunks
                    .iter()
                    .filter_map(|c| c.table.clone())
                    .collect();
                let column_chunks = self
                    .index
                    .retrieve_planning_context(&sub_query.intent, &sub_query.datasource_id, &table_names, COLUMN_K)
                    .await
                    .unwrap_or_default();

                table_names
                    .iter()
                    .map(|table| RetrievedTable {
                        name: table.clone(),
                        columns: column_chunks
                            .iter()
                            .filter(|c| matches!(c.chunk_type, ChunkType::Column) && c.table.as_deref() == Some(table.as_str()))
                            .filter_map(|c| c.column.clone())
                            .collect(),
                    })
                    .collect()
            }
            _ => self.fallback_tables(&sub_query.datasource_id),
        };

        if tables.is_empty() {
            let error = PipelineError::new(
                self.name(),
                "schema retrieval yielded no tables for this datasource",
                Severity::Error,
                ErrorCode::SchemaRetrievalFailed,
                true,
            )
            .with_datasource(sub_query.datasource_id.clone());
            delta.last_error = Some(error.clone());
            delta.errors.push(error);
            delta.reasoning.push(format!("schema retrieval found no tables for '{}'", sub_query.datasource_id));
            return Ok(delta);
        }

        delta.reasoning.push(format!("retrieved {} table(s) for '{}'", tables.len(), sub_query.datasource_id));
        delta.schema_tables = tables;
        delta.stage = crate::types::SubPipelineStage::SchemaRetrieved;
        delta.last_error = None;
        Ok(delta)
    }

    fn name(&self) -> &str {
        "schema_retriever"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubQuery;
    use querymesh_retrieval::{DeterministicEmbedder, DiversityPass, InMemoryRetrievalIndex};
    use querymesh_schema::InMemorySchemaStore;
    use querymesh_retrieval::Chunk;

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
    async fn falls_back_to_full_snapshot_when_retrieval_is_empty() {
        let embedder = Arc::new(DeterministicEmbedder::new(8));
        let index = Arc::new(InMemoryRetrievalIndex::new(embedder, DiversityPass::None));
        let store = Arc::new(InMemorySchemaStore::new());

        let snapshot = querymesh_schema::SchemaSnapshot {
            datasource_id: "manufacturing".to_string(),
            contract: querymesh_schema::SchemaContract {
                tables: vec![(
                    "public.factories".to_string(),
                    querymesh_schema::TableContract {
                        columns: vec![querymesh_schema::ColumnContract {
                            name: "name".to_string(),
                            data_type: "text".to_string(),
                            nullable: false,
                            primary_key: false,
                        }],
                        foreign_keys: vec![],
                    },
                )],
            },
            metadata: Default::default(),
        };
        store.register_snapshot(snapshot, 5).unwrap();

        let node = SchemaRetriever::new(index, store);
        let state = SubPipelineState::new(sub_query(), vec![], "t", "ten", "r", "sg1");
        let delta = node.execute(&state).await.unwrap();

        assert_eq!(delta.schema_tables.len(), 1);
        assert_eq!(delta.schema_tables[0].name, "public.factories");
        assert!(delta.last_error.is_none());
    }

    #[tokio::test]
    async fn retrieval_hit_restricts_columns_to_retrieved_tables() {
        let embedder = Arc::new(DeterministicEmbedder::new(8));
        let index = Arc::new(InMemoryRetrievalIndex::new(embedder.clone(), DiversityPass::None));
        let store = Arc::new(InMemorySchemaStore::new());

        let table_chunk = Chunk::new(
            "manufacturing",
            "v1",
            ChunkType::Table,
            Some("public.factories".to_string()),
            None,
            "factories table",
            embedder.embed_query("factories table").await.unwrap(),
        );
        let column_chunk = Chunk::new(
            "manufacturing",
            "v1",
            ChunkType::Column,
            Some("public.factories".to_string()),
            Some("name".to_string()),
            "factories.name",
            embedder.embed_query("factories.name").await.unwrap(),
        );
        index.refresh_schema_chunks("manufacturing", "v1", vec![table_chunk, column_chunk], &[]);

        let node = SchemaRetriever::new(index, store);
        let state = SubPipelineState::new(sub_query(), vec![], "t", "ten", "r", "sg1");
        let delta = node.execute(&state).await.unwrap();

        assert_eq!(delta.schema_tables.len(), 1);
        assert_eq!(delta.schema_tables[0].columns, vec!["name".to_string()]);
    }

    #[tokio::test]
    async fn missing_tables_everywhere_is_a_retryable_schema_retrieval_failure() {
        let embedder = Arc::new(DeterministicEmbedder::new(8));
        let index = Arc::new(InMemoryRetrievalIndex::new(embedder, DiversityPass::None));
        let store = Arc::new(InMemorySchemaStore::new());

        let node = SchemaRetriever::new(index, store);
        let state = SubPipelineState::new(sub_query(), vec![], "t", "ten", "r", "sg1");
        let delta = node.execute(&state).await.unwrap();

        assert!(delta.last_error.is_some());
        assert_eq!(delta.last_error.unwrap().error_code, ErrorCode::SchemaRetrievalFailed);
    }
}
