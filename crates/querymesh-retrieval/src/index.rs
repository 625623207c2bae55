//! The retrieval index trait and an in-memory implementation (spec §4.4).

use crate::embedder::Embedder;
use crate::error::RetrievalError;
use crate::similarity::{mmr_select, top_k_by_similarity};
use crate::types::{Chunk, ChunkType};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Optional diversity pass applied after nearest-neighbor ranking.
#[derive(Debug, Clone, Copy)]
pub enum DiversityPass {
    /// Plain nearest-neighbor ranking, no diversity re-ranking.
    None,
    /// Max-marginal-relevance with the given `lambda` (relevance weight).
    Mmr { lambda: f32 },
}

/// An embedding-backed chunk store (spec §4.4).
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Atomically deletes all chunks tagged with any of `evicted_versions`
    /// and inserts `chunks`, all for `datasource_id`/`schema_version`.
    fn refresh_schema_chunks(
        &self,
        datasource_id: &str,
        schema_version: &str,
        chunks: Vec<Chunk>,
        evicted_versions: &[String],
    );

    /// Datasource-level chunks ranked by similarity to `query`.
    async fn retrieve_datasource_candidates(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Chunk>, RetrievalError>;

    /// Table-level chunks within `datasource_id` ranked by similarity.
    async fn retrieve_schema_context(
        &self,
        query: &str,
        datasource_id: &str,
        k: usize,
    ) -> Result<Vec<Chunk>, RetrievalError>;

    /// Column/relationship chunks restricted to `table_full_names` within
    /// `datasource_id`.
    async fn retrieve_planning_context(
        &self,
        query: &str,
        datasource_id: &str,
        table_full_names: &[String],
        k: usize,
    ) -> Result<Vec<Chunk>, RetrievalError>;
}

/// In-memory [`RetrievalIndex`], backed by an [`Embedder`] for query-side
/// embedding (chunks already carry pre-computed embeddings at insert time).
pub struct InMemoryRetrievalIndex {
    embedder: Arc<dyn Embedder>,
    diversity: DiversityPass,
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryRetrievalIndex {
    /// Builds an index using `embedder` for query embedding and `diversity`
    /// as the post-ranking diversity pass.
    pub fn new(embedder: Arc<dyn Embedder>, diversity: DiversityPass) -> Self {
        Self {
            embedder,
            diversity,
            chunks: RwLock::new(Vec::new()),
        }
    }

    fn rank<'a>(&self, query_embedding: &[f32], pool: &'a [Chunk], k: usize) -> Vec<&'a Chunk> {
        let candidates: Vec<(usize, &[f32])> = pool
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.embedding.as_slice()))
            .collect();

        let indices = match self.diversity {
            DiversityPass::None => top_k_by_similarity(query_embedding, &candidates, k),
            DiversityPass::Mmr { lambda } => mmr_select(query_embedding, &candidates, k, lambda),
        };

        indices.into_iter().map(|i| &pool[i]).collect()
    }
}

#[async_trait]
impl RetrievalIndex for InMemoryRetrievalIndex {
    fn refresh_schema_chunks(
        &self,
        datasource_id: &str,
        _schema_version: &str,
        chunks: Vec<Chunk>,
        evicted_versions: &[String],
    ) {
        let mut store = self.chunks.write();
        store.retain(|c| {
            !(c.datasource_id == datasource_id && evicted_versions.contains(&c.schema_version))
        });
        store.extend(chunks);
    }

    async fn retrieve_datasource_candidates(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Chunk>, RetrievalError> {
        let embedding = self.embedder.embed_query(query).await?;
        let store = self.chunks.read();
        let pool: Vec<Chunk> = store
            .iter()
            .filter(|c| matches!(c.chunk_type, ChunkType::Datasource))
            .cloned()
            .collect();
        Ok(self.rank(&embedding, &pool, k).into_iter().cloned().collect())
    }

    async fn retrieve_schema_context(
        &self,
        query: &str,
        datasource_id: &str,
        k: usize,
    ) -> Result<Vec<Chunk>, RetrievalError> {
        let embedding = self.embedder.embed_query(query).await?;
        let store = self.chunks.read();
        let pool: Vec<Chunk> = store
            .iter()
            .filter(|c| c.datasource_id == datasource_id && matches!(c.chunk_type, ChunkType::Table))
            .cloned()
            .collect();
        Ok(self.rank(&embedding, &pool, k).into_iter().cloned().collect())
    }

    async fn retrieve_planning_context(
        &self,
        query: &str,
        datasource_id: &str,
        table_full_names: &[String],
        k: usize,
    ) -> Result<Vec<Chunk>, RetrievalError> {
        let embedding = self.embedder.embed_query(query).await?;
        let store = self.chunks.read();
        let pool: Vec<Chunk> = store
            .iter()
            .filter(|c| {
                c.datasource_id == datasource_id
                    && matches!(c.chunk_type, ChunkType::Column | ChunkType::ForeignKey)
                    && c.table.as_deref().is_some_and(|t| table_full_names.iter().any(|n| n == t))
            })
            .cloned()
            .collect();
        Ok(self.rank(&embedding, &pool, k).into_iter().cloned().collect())
    }
}
