//! Retrieval Index (C4): an embedding-backed chunk store over schema
//! structure and example questions (spec §4.4).

pub mod embedder;
pub mod error;
pub mod index;
pub mod similarity;
pub mod types;

pub use embedder::{DeterministicEmbedder, Embedder, EmbedderError};
pub use error::RetrievalError;
pub use index::{DiversityPass, InMemoryRetrievalIndex, RetrievalIndex};
pub use types::{Chunk, ChunkType};
