//! Schema Store (C3): register-on-index, content-fingerprinted schema
//! snapshots, read-only everywhere else (spec §4.3).

pub mod error;
pub mod fingerprint;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;
pub mod store;
pub mod types;

pub use error::SchemaError;
pub use fingerprint::fingerprint;
#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteSchemaStore;
pub use store::{InMemorySchemaStore, SchemaStore};
pub use types::{
    Cardinality, ColumnContract, ForeignKeyContract, SchemaContract, SchemaMetadata, SchemaSnapshot,
    TableContract,
};
