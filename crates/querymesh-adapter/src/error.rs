//! Errors from the adapter contract and registry (spec §4.1).

use thiserror::Error;

/// Errors an [`crate::adapter::Adapter`] or [`crate::registry::AdapterRegistry`]
/// can raise. `execute` itself never raises these — failures there are
/// represented as `ResultFrame{success: false, ..}` (spec §4.1).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    /// No adapter constructor is registered for this engine tag; fails
    /// registry startup (spec §4.1 "Unknown engine tags fail startup").
    #[error("unknown engine tag '{0}'")]
    UnknownEngineTag(String),
    /// Secret resolution failed while building connection parameters;
    /// fails registry startup.
    #[error("secret resolution failed for datasource '{datasource_id}': {message}")]
    SecretResolutionFailed { datasource_id: String, message: String },
    /// The adapter failed to establish its connection during registration.
    #[error("adapter '{datasource_id}' failed to connect: {message}")]
    ConnectionFailed { datasource_id: String, message: String },
    /// A duplicate `datasource_id` was registered.
    #[error("duplicate datasource id '{0}'")]
    DuplicateDatasourceId(String),
}
