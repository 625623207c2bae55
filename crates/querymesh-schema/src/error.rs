//! Errors produced by the schema store (spec §4.3).

use thiserror::Error;

/// Errors from [`crate::store::SchemaStore`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaError {
    /// The snapshot's contract failed structural validation (spec §3
    /// invariants i/ii) and was rejected before fingerprinting.
    #[error("invalid schema contract: {0}")]
    InvalidContract(String),
    /// No snapshot exists for the requested `(datasource_id, version)`.
    #[error("no schema snapshot for datasource '{datasource_id}' version '{version}'")]
    NotFound { datasource_id: String, version: String },
    /// No snapshot exists at all for `datasource_id`.
    #[error("no schema snapshot registered for datasource '{0}'")]
    NoVersions(String),
    /// The requested table is not present in the resolved contract.
    #[error("table '{table}' not found in datasource '{datasource_id}' schema '{version}'")]
    TableNotFound {
        datasource_id: String,
        version: String,
        table: String,
    },
    /// The backing store (e.g. sqlite file) failed.
    #[error("schema store backend error: {0}")]
    Backend(String),
}
