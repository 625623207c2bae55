//! Artifact reference and write-metadata types (spec §3 "Artifact reference").

use serde::{Deserialize, Serialize};

/// The backend an [`ArtifactRef`]'s `uri` is rooted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactBackendTag {
    Local,
    S3,
    Adls,
}

/// The identity tuple a written artifact's path is deterministic over
/// (spec §4.5).
#[derive(Debug, Clone)]
pub struct WriteMetadata {
    pub tenant_id: String,
    pub request_id: String,
    pub subgraph_name: String,
    pub dag_node_id: String,
    pub schema_version: Option<String>,
}

/// An immutable pointer to a persisted relation in columnar form (spec §3).
///
/// Invariants: the `uri` is deterministic in
/// `(tenant_id, request_id, subgraph_name, dag_node_id, schema_version)`;
/// `content_hash` is computed before the reference is published; two writes
/// with identical payload yield the same hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub uri: String,
    pub backend: ArtifactBackendTag,
    pub row_count: u64,
    pub column_names: Vec<String>,
    pub byte_size: u64,
    pub content_hash: String,
    pub created_at: String,
    pub schema_version: Option<String>,
    pub path_template: String,
}
