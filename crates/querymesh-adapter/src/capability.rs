//! The closed capability tag set (spec §3 "Capability").

use serde::{Deserialize, Serialize};

/// A tag identifying what an adapter can do. `capabilities()` is authoritative
/// for routing — not duck typing (spec §9 "Dynamic dispatch over
/// heterogeneous engines").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum Capability {
    /// Required on any data source the core routes a scan to.
    SupportsSql,
    SupportsSchemaIntrospection,
    SupportsDryRun,
    SupportsCostEstimate,
    SupportsRest,
    SupportsLake,
}
