//! Content fingerprinting of a [`SchemaContract`] (spec §3 invariant iii).
//!
//! The fingerprint covers structure only — table names, columns, foreign
//! keys — never row counts or statistics, so a stats-only refresh produces
//! the same `schema_version` and does not churn the retrieval index (see
//! DESIGN.md, resolved Open Question).

use crate::types::SchemaContract;
use sha2::{Digest, Sha256};

/// Computes a stable, deterministic fingerprint of `contract`'s structure.
/// Two contracts with identical table/column/foreign-key content (in any
/// input order) produce the same fingerprint, because `SchemaContract`'s
/// `Vec` is sorted by table name before hashing.
pub fn fingerprint(contract: &SchemaContract) -> String {
    let mut sorted = contract.tables.clone();
    sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (_, table) in &mut sorted {
        table.columns.sort_by(|a, b| a.name.cmp(&b.name));
        table.foreign_keys.sort_by(|a, b| a.columns.cmp(&b.columns));
    }

    let canonical = SchemaContract { tables: sorted };
    let bytes = serde_json::to_vec(&canonical).expect("schema contract serializes");

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}
