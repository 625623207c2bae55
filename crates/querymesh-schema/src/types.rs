//! Schema snapshot types (spec §3 "Schema snapshot").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Join cardinality of a foreign key relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// One column in a [`TableContract`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnContract {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// A foreign key relationship from this table to another table in the same
/// [`SchemaContract`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyContract {
    pub columns: Vec<String>,
    pub references_table: String,
    pub references_columns: Vec<String>,
    pub cardinality: Cardinality,
}

/// The structural contract of one table: `[schema].[table]` is the key used
/// in [`SchemaContract::tables`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableContract {
    pub columns: Vec<ColumnContract>,
    pub foreign_keys: Vec<ForeignKeyContract>,
}

/// The structural part of a schema snapshot: table name to contract. Kept as
/// an ordered `Vec` (rather than a `HashMap`) so that fingerprinting and
/// iteration are deterministic without a separate sort step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaContract {
    pub tables: Vec<(String, TableContract)>,
}

impl SchemaContract {
    /// Looks up a table by its fully-qualified name.
    pub fn table(&self, full_name: &str) -> Option<&TableContract> {
        self.tables.iter().find(|(name, _)| name == full_name).map(|(_, t)| t)
    }

    /// Validates the structural invariants from spec §3:
    /// (i) column names unique within a table; (ii) every foreign key
    /// references a table present in this contract.
    pub fn validate(&self) -> Result<(), String> {
        for (table_name, table) in &self.tables {
            let mut seen = std::collections::HashSet::new();
            for column in &table.columns {
                if !seen.insert(column.name.as_str()) {
                    return Err(format!(
                        "duplicate column '{}' in table '{table_name}'",
                        column.name
                    ));
                }
            }
            for fk in &table.foreign_keys {
                if self.table(&fk.references_table).is_none() {
                    return Err(format!(
                        "table '{table_name}' has a foreign key referencing unknown table '{}'",
                        fk.references_table
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Per-table/column descriptive metadata, used by retrieval and planning but
/// excluded from the `schema_version` fingerprint (see DESIGN.md — resolved
/// Open Question: statistics refresh must not churn the retrieval index).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub table_descriptions: HashMap<String, String>,
    pub column_descriptions: HashMap<String, String>,
    pub row_counts: HashMap<String, u64>,
    pub column_synonyms: HashMap<String, Vec<String>>,
    pub pii_columns: HashMap<String, Vec<String>>,
}

/// A full schema snapshot: `(contract, metadata)` per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub datasource_id: String,
    pub contract: SchemaContract,
    pub metadata: SchemaMetadata,
}
