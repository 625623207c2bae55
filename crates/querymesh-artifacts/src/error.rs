//! Errors from the artifact store (spec §4.5).

use thiserror::Error;

/// Errors from [`crate::store::ArtifactStore`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArtifactError {
    #[error("failed to encode result frame as parquet: {0}")]
    EncodeFailed(String),
    #[error("failed to decode parquet artifact: {0}")]
    DecodeFailed(String),
    #[error("backend I/O failed for uri '{uri}': {message}")]
    BackendIo { uri: String, message: String },
    #[error("artifact not found at uri '{0}'")]
    NotFound(String),
}
