//! Embedding backend trait, mirrored on the teacher's `Embeddings` provider
//! traits (e.g. `dashflow-openai`'s `OpenAIEmbeddings`): a small async trait
//! that concrete providers implement, kept out of this crate's scope per
//! the adapter Non-goals (the LLM/embedding provider transport is external).

use async_trait::async_trait;
use thiserror::Error;

/// Errors from an [`Embedder`] backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmbedderError {
    #[error("embedding backend failed: {0}")]
    BackendFailed(String),
}

/// Converts text into a dense vector for nearest-neighbor search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embeds a batch of documents. The default implementation calls
    /// `embed_query` sequentially; providers with a native batch endpoint
    /// should override this.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_query(text).await?);
        }
        Ok(out)
    }
}

/// A deterministic, hash-based embedder with no external dependency, used
/// by tests and the `querymesh-testing` harness in place of a real
/// provider.
pub struct DeterministicEmbedder {
    dims: usize,
}

impl DeterministicEmbedder {
    /// Builds an embedder producing vectors of the given dimensionality.
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl Embedder for DeterministicEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        use sha2::{Digest, Sha256};
        let mut out = Vec::with_capacity(self.dims);
        let mut counter: u32 = 0;
        while out.len() < self.dims {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for byte in digest.iter() {
                if out.len() == self.dims {
                    break;
                }
                // Map byte to [-1, 1].
                out.push((*byte as f32 / 127.5) - 1.0);
            }
            counter += 1;
        }
        Ok(out)
    }
}
