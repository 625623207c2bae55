//! Retrieval chunk types (spec §3 "Retrieval chunk").

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The kind of content a [`Chunk`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Datasource,
    Table,
    Column,
    ForeignKey,
    Example,
}

/// One retrievable unit of schema or example context.
///
/// Invariant (spec §3): every chunk is retrievable by
/// `(datasource_id, schema_version, type)`; eviction of a `schema_version`
/// deletes all chunks tagged with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub datasource_id: String,
    pub schema_version: String,
    pub chunk_type: ChunkType,
    pub table: Option<String>,
    pub column: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Builds a chunk, deriving its `id` deterministically from identity
    /// fields so re-indexing identical content reproduces the same id
    /// (spec §3 "deterministic chunk id").
    pub fn new(
        datasource_id: impl Into<String>,
        schema_version: impl Into<String>,
        chunk_type: ChunkType,
        table: Option<String>,
        column: Option<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        let datasource_id = datasource_id.into();
        let schema_version = schema_version.into();
        let content = content.into();
        let id = deterministic_chunk_id(
            &datasource_id,
            &schema_version,
            chunk_type,
            table.as_deref(),
            column.as_deref(),
            &content,
        );
        Self {
            id,
            datasource_id,
            schema_version,
            chunk_type,
            table,
            column,
            content,
            embedding,
        }
    }
}

fn deterministic_chunk_id(
    datasource_id: &str,
    schema_version: &str,
    chunk_type: ChunkType,
    table: Option<&str>,
    column: Option<&str>,
    content: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(datasource_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(schema_version.as_bytes());
    hasher.update(b"\0");
    hasher.update(format!("{chunk_type:?}").as_bytes());
    hasher.update(b"\0");
    hasher.update(table.unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(column.unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
