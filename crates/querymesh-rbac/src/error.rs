//! Errors from policy loading (spec §4.7).

use thiserror::Error;

/// Errors raised while constructing RBAC policy from configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RbacError {
    /// An `allowed_tables` entry is not namespaced as `*`, `ds.*`, or
    /// `ds.table` (spec §4.7: "unnamespaced entries fail policy
    /// validation").
    #[error("invalid table pattern '{0}': must be '*', 'datasource.*', or 'datasource.table'")]
    InvalidTablePattern(String),
}
