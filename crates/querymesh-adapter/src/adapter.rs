//! The adapter contract (spec §4.1): one capability-typed interface every
//! engine-specific implementation satisfies.

use crate::capability::Capability;
use async_trait::async_trait;
use querymesh_core::{AdapterRequest, ResultFrame};
use querymesh_schema::SchemaSnapshot;
use std::collections::{HashMap, HashSet};

/// A single configured, connected data source.
///
/// Lifecycle: constructed at registration, held for the registry's
/// lifetime, never reconstructed per request (spec §3 "Adapter instance").
#[async_trait]
pub trait Adapter: Send + Sync {
    /// This adapter instance's `datasource_id`.
    fn datasource_id(&self) -> &str;

    /// Pure, cheap; determines routability (spec §4.1).
    fn capabilities(&self) -> HashSet<Capability>;

    /// Idempotent initialization; performed once at registration.
    async fn connect(&self) -> Result<(), String>;

    /// Full, canonical schema snapshot; used by indexing.
    async fn fetch_schema_snapshot(&self) -> Result<SchemaSnapshot, String>;

    /// Executes a request. Must never raise: runtime failures are
    /// represented as `ResultFrame{success: false, ..}` (spec §4.1).
    async fn execute(&self, request: AdapterRequest) -> ResultFrame;

    /// The normalized SQL dialect tag, e.g. `"postgres"`, `"sqlite"`.
    fn get_dialect(&self) -> &str;

    /// A lightweight health probe.
    async fn test_connection(&self) -> bool;

    /// Free-form details for diagnostics (never secret values).
    fn get_details(&self) -> HashMap<String, String>;
}
