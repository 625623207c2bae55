//! Deterministic artifact path template (spec §6 "Artifact URI template"):
//! `<tenant_id>/<request_id>/<subgraph_name>/<dag_node_id>/<schema_version>/part-00000.parquet`.

use crate::types::WriteMetadata;

/// The declared path template, with `{}` placeholders in template order.
pub const PATH_TEMPLATE: &str =
    "{tenant_id}/{request_id}/{subgraph_name}/{dag_node_id}/{schema_version}/part-00000.parquet";

/// Renders the deterministic path for `meta`. A missing `schema_version`
/// renders as the literal segment `unversioned`, so the path stays
/// well-formed for adapters that do not carry one (e.g. `SUPPORTS_REST`
/// sources without a schema snapshot).
pub fn render_path(meta: &WriteMetadata) -> String {
    let schema_version = meta.schema_version.as_deref().unwrap_or("unversioned");
    format!(
        "{}/{}/{}/{}/{}/part-00000.parquet",
        meta.tenant_id, meta.request_id, meta.subgraph_name, meta.dag_node_id, schema_version
    )
}
