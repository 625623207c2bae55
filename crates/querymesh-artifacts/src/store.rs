//! The artifact store (spec §4.5): content-addressed, deterministic
//! columnar persistence of `ResultFrame`s.

use crate::backend::ArtifactBackend;
use crate::codec::{decode_result_frame, encode_result_frame};
use crate::error::ArtifactError;
use crate::path::render_path;
use crate::types::{ArtifactRef, WriteMetadata};
use querymesh_core::ResultFrame;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Writes and reads [`ResultFrame`]s as content-addressed parquet artifacts.
pub struct ArtifactStore {
    backend: Arc<dyn ArtifactBackend>,
}

impl ArtifactStore {
    /// Builds a store over `backend`.
    pub fn new(backend: Arc<dyn ArtifactBackend>) -> Self {
        Self { backend }
    }

    /// Encodes `frame` as parquet, writes it at the deterministic path for
    /// `meta`, and returns an [`ArtifactRef`]. Two calls with identical
    /// `frame` content (regardless of `meta`'s irrelevant fields) produce
    /// identical `content_hash`es (spec §8 property 2); two calls with
    /// identical `meta` produce identical `uri`s, so a retried write is a
    /// same-content overwrite.
    pub async fn write_result_frame(
        &self,
        frame: &ResultFrame,
        meta: WriteMetadata,
    ) -> Result<ArtifactRef, ArtifactError> {
        let bytes = encode_result_frame(frame)?;
        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        };

        let relative_path = render_path(&meta);
        self.backend.write(&relative_path, bytes.clone()).await?;

        Ok(ArtifactRef {
            uri: relative_path.clone(),
            backend: self.backend.tag(),
            row_count: frame.row_count,
            column_names: frame.columns.iter().map(|c| c.name.clone()).collect(),
            byte_size: bytes.len() as u64,
            content_hash,
            created_at: chrono::Utc::now().to_rfc3339(),
            schema_version: meta.schema_version,
            path_template: crate::path::PATH_TEMPLATE.to_string(),
        })
    }

    /// Reads back the frame referenced by `artifact_ref`.
    pub async fn read_result_frame(&self, artifact_ref: &ArtifactRef) -> Result<ResultFrame, ArtifactError> {
        let bytes = self.backend.read(&artifact_ref.uri).await?;
        decode_result_frame(bytes)
    }
}
