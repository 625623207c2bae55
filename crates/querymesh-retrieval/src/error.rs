//! Errors from the retrieval index (spec §4.4).

use crate::embedder::EmbedderError;
use thiserror::Error;

/// Errors from [`crate::index::RetrievalIndex`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RetrievalError {
    /// The query could not be embedded.
    #[error("failed to embed query: {0}")]
    EmbeddingFailed(#[from] EmbedderError),
}
