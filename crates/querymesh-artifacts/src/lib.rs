//! Artifact Store (C5): content-addressed, columnar persistence of
//! `ResultFrame`s produced by scan and combine nodes (spec §4.5).

pub mod backend;
pub mod codec;
pub mod error;
pub mod path;
pub mod store;
pub mod types;

pub use backend::{ArtifactBackend, LocalArtifactBackend};
pub use codec::{decode_result_frame, encode_result_frame};
pub use error::ArtifactError;
pub use store::ArtifactStore;
pub use types::{ArtifactBackendTag, ArtifactRef, WriteMetadata};
