//! The schema store trait and an in-memory implementation (spec §4.3).

use crate::error::SchemaError;
use crate::fingerprint::fingerprint;
use crate::types::{SchemaMetadata, SchemaSnapshot, TableContract};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Register-on-index, read-only elsewhere (spec §4.3).
pub trait SchemaStore: Send + Sync {
    /// Registers `snapshot`, returning the resolved version and any versions
    /// evicted as a result. If a snapshot with an identical contract
    /// fingerprint already exists for this datasource, returns that version
    /// unchanged with an empty eviction list (idempotent re-registration).
    fn register_snapshot(
        &self,
        snapshot: SchemaSnapshot,
        max_versions: usize,
    ) -> Result<(String, Vec<String>), SchemaError>;

    /// The most recently registered version for `datasource_id`.
    fn get_latest_version(&self, datasource_id: &str) -> Result<String, SchemaError>;

    /// All retained versions for `datasource_id`, oldest first.
    fn list_versions(&self, datasource_id: &str) -> Result<Vec<String>, SchemaError>;

    /// The full snapshot at `(datasource_id, version)`.
    fn get_snapshot(&self, datasource_id: &str, version: &str) -> Result<SchemaSnapshot, SchemaError>;

    /// A single table's structural contract.
    fn get_table_contract(
        &self,
        datasource_id: &str,
        version: &str,
        table_full_name: &str,
    ) -> Result<TableContract, SchemaError>;

    /// The descriptive metadata for the snapshot (spec §3: descriptions, row
    /// counts, statistics, synonyms, PII flags).
    fn get_table_metadata(&self, datasource_id: &str, version: &str) -> Result<SchemaMetadata, SchemaError>;
}

struct DatasourceHistory {
    /// Oldest first; index 0 is evicted first when `max_versions` is exceeded.
    versions: Vec<String>,
    snapshots: HashMap<String, SchemaSnapshot>,
}

/// An in-memory [`SchemaStore`], suitable as the default backend and for
/// tests. A file-backed (sqlite-embedded) backend with identical observable
/// behavior is provided behind the `sqlite` feature (spec §4.3 "Backends:
/// in-memory and file-backed... with identical observable behavior").
#[derive(Default)]
pub struct InMemorySchemaStore {
    datasources: RwLock<HashMap<String, DatasourceHistory>>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaStore for InMemorySchemaStore {
    fn register_snapshot(
        &self,
        snapshot: SchemaSnapshot,
        max_versions: usize,
    ) -> Result<(String, Vec<String>), SchemaError> {
        snapshot
            .contract
            .validate()
            .map_err(SchemaError::InvalidContract)?;

        let version = fingerprint(&snapshot.contract);
        let mut datasources = self.datasources.write();
        let history = datasources
            .entry(snapshot.datasource_id.clone())
            .or_insert_with(|| DatasourceHistory {
                versions: Vec::new(),
                snapshots: HashMap::new(),
            });

        if history.snapshots.contains_key(&version) {
            return Ok((version, Vec::new()));
        }

        history.versions.push(version.clone());
        history.snapshots.insert(version.clone(), snapshot);

        let mut evicted = Vec::new();
        let max_versions = max_versions.max(1);
        while history.versions.len() > max_versions {
            let oldest = history.versions.remove(0);
            history.snapshots.remove(&oldest);
            evicted.push(oldest);
        }

        Ok((version, evicted))
    }

    fn get_latest_version(&self, datasource_id: &str) -> Result<String, SchemaError> {
        let datasources = self.datasources.read();
        datasources
            .get(datasource_id)
            .and_then(|h| h.versions.last().cloned())
            .ok_or_else(|| SchemaError::NoVersions(datasource_id.to_string()))
    }

    fn list_versions(&self, datasource_id: &str) -> Result<Vec<String>, SchemaError> {
        let datasources = self.datasources.read();
        datasources
            .get(datasource_id)
            .map(|h| h.versions.clone())
            .ok_or_else(|| SchemaError::NoVersions(datasource_id.to_string()))
    }

    fn get_snapshot(&self, datasource_id: &str, version: &str) -> Result<SchemaSnapshot, SchemaError> {
        let datasources = self.datasources.read();
        datasources
            .get(datasource_id)
            .and_then(|h| h.snapshots.get(version).cloned())
            .ok_or_else(|| SchemaError::NotFound {
                datasource_id: datasource_id.to_string(),
                version: version.to_string(),
            })
    }

    fn get_table_contract(
        &self,
        datasource_id: &str,
        version: &str,
        table_full_name: &str,
    ) -> Result<TableContract, SchemaError> {
        let snapshot = self.get_snapshot(datasource_id, version)?;
        snapshot
            .contract
            .table(table_full_name)
            .cloned()
            .ok_or_else(|| SchemaError::TableNotFound {
                datasource_id: datasource_id.to_string(),
                version: version.to_string(),
                table: table_full_name.to_string(),
            })
    }

    fn get_table_metadata(&self, datasource_id: &str, version: &str) -> Result<SchemaMetadata, SchemaError> {
        Ok(self.get_snapshot(datasource_id, version)?.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnContract, SchemaContract};

    fn snapshot(datasource_id: &str, table_name: &str) -> SchemaSnapshot {
        SchemaSnapshot {
            datasource_id: datasource_id.to_string(),
            contract: SchemaContract {
                tables: vec![(
                    table_name.to_string(),
                    TableContract {
                        columns: vec![ColumnContract {
                            name: "id".to_string(),
                            data_type: "int".to_string(),
                            nullable: false,
                            primary_key: true,
                        }],
                        foreign_keys: Vec::new(),
                    },
                )],
            },
            metadata: SchemaMetadata::default(),
        }
    }

    #[test]
    fn identical_contract_reregistration_is_idempotent() {
        let store = InMemorySchemaStore::new();
        let (v1, evicted1) = store
            .register_snapshot(snapshot("ds1", "public.orders"), 5)
            .unwrap();
        let (v2, evicted2) = store
            .register_snapshot(snapshot("ds1", "public.orders"), 5)
            .unwrap();
        assert_eq!(v1, v2);
        assert!(evicted1.is_empty());
        assert!(evicted2.is_empty());
        assert_eq!(store.list_versions("ds1").unwrap().len(), 1);
    }

    #[test]
    fn distinct_contracts_append_new_versions_and_evict_oldest() {
        let store = InMemorySchemaStore::new();
        store.register_snapshot(snapshot("ds1", "public.a"), 2).unwrap();
        store.register_snapshot(snapshot("ds1", "public.b"), 2).unwrap();
        let (_, evicted) = store.register_snapshot(snapshot("ds1", "public.c"), 2).unwrap();

        assert_eq!(evicted.len(), 1);
        assert_eq!(store.list_versions("ds1").unwrap().len(), 2);
    }

    #[test]
    fn invalid_contract_is_rejected_before_fingerprinting() {
        let mut bad = snapshot("ds1", "public.orders");
        bad.contract.tables[0].1.foreign_keys.push(crate::types::ForeignKeyContract {
            columns: vec!["id".to_string()],
            references_table: "public.missing".to_string(),
            references_columns: vec!["id".to_string()],
            cardinality: crate::types::Cardinality::ManyToOne,
        });
        let store = InMemorySchemaStore::new();
        assert!(store.register_snapshot(bad, 5).is_err());
    }

    #[test]
    fn unknown_datasource_errors_on_read() {
        let store = InMemorySchemaStore::new();
        assert!(store.get_latest_version("missing").is_err());
    }
}
