//! Pluggable byte storage backends (spec §4.5 "Backend is pluggable
//! (`local|s3|adls`)"). Only the local filesystem backend is implemented
//! here; `s3`/`adls` are out of this crate's scope as concrete backends
//! (spec §1 Non-goals — concrete adapter/backend implementations beyond a
//! reference fixture), but [`ArtifactBackend`] is the seam a production
//! deployment plugs them into.

use crate::error::ArtifactError;
use crate::types::ArtifactBackendTag;
use async_trait::async_trait;
use std::path::PathBuf;

/// Raw byte storage keyed by a relative path (the rendered artifact path,
/// see [`crate::path::render_path`]).
#[async_trait]
pub trait ArtifactBackend: Send + Sync {
    /// The backend tag recorded on every [`crate::types::ArtifactRef`] this
    /// backend produces.
    fn tag(&self) -> ArtifactBackendTag;

    /// Writes `bytes` at `relative_path`, creating any parent directories
    /// (or their backend-specific equivalent). Overwrites silently, which is
    /// safe because callers only ever write byte-identical content at a
    /// given path (spec §4.5: "re-execution is a no-op overwrite").
    async fn write(&self, relative_path: &str, bytes: Vec<u8>) -> Result<(), ArtifactError>;

    /// Reads back the bytes written at `relative_path`.
    async fn read(&self, relative_path: &str) -> Result<Vec<u8>, ArtifactError>;
}

/// Stores artifacts under a root directory on the local filesystem.
pub struct LocalArtifactBackend {
    root: PathBuf,
}

impl LocalArtifactBackend {
    /// Builds a backend rooted at `root`. The directory is created lazily on
    /// first write, not at construction time.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }
}

#[async_trait]
impl ArtifactBackend for LocalArtifactBackend {
    fn tag(&self) -> ArtifactBackendTag {
        ArtifactBackendTag::Local
    }

    async fn write(&self, relative_path: &str, bytes: Vec<u8>) -> Result<(), ArtifactError> {
        let path = self.full_path(relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArtifactError::BackendIo { uri: relative_path.to_string(), message: e.to_string() })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ArtifactError::BackendIo { uri: relative_path.to_string(), message: e.to_string() })
    }

    async fn read(&self, relative_path: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = self.full_path(relative_path);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound(relative_path.to_string())
            } else {
                ArtifactError::BackendIo { uri: relative_path.to_string(), message: e.to_string() }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_reads_back_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalArtifactBackend::new(dir.path());
        backend.write("a/b/part-00000.parquet", vec![1, 2, 3]).await.unwrap();
        let bytes = backend.read("a/b/part-00000.parquet").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_path_yields_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalArtifactBackend::new(dir.path());
        let err = backend.read("missing.parquet").await.unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound(_)));
    }
}
