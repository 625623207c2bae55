//! File-backed schema store using an embedded relational database, behind
//! the `sqlite` feature. Mirrors [`crate::store::InMemorySchemaStore`]'s
//! observable behavior exactly (spec §4.3), trading memory residency for
//! durability across process restarts.

use crate::error::SchemaError;
use crate::fingerprint::fingerprint;
use crate::store::SchemaStore;
use crate::types::{SchemaMetadata, SchemaSnapshot, TableContract};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

/// A [`SchemaStore`] backed by a sqlite file.
pub struct SqliteSchemaStore {
    conn: Mutex<Connection>,
}

impl SqliteSchemaStore {
    /// Opens (creating if absent) the sqlite file at `path` and ensures the
    /// schema table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let conn = Connection::open(path).map_err(|e| SchemaError::Backend(e.to_string()))?;
        Self::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory sqlite database; useful for tests that want the
    /// sqlite code path without a temp file.
    pub fn open_in_memory() -> Result<Self, SchemaError> {
        let conn = Connection::open_in_memory().map_err(|e| SchemaError::Backend(e.to_string()))?;
        Self::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init(conn: &Connection) -> Result<(), SchemaError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_snapshots (
                datasource_id TEXT NOT NULL,
                version TEXT NOT NULL,
                seq INTEGER NOT NULL,
                snapshot_json TEXT NOT NULL,
                PRIMARY KEY (datasource_id, version)
            );",
        )
        .map_err(|e| SchemaError::Backend(e.to_string()))
    }
}

impl SchemaStore for SqliteSchemaStore {
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
        let conn = self.conn.lock();

        let already_exists: bool = conn
            .query_row(
                "SELECT 1 FROM schema_snapshots WHERE datasource_id = ?1 AND version = ?2",
                params![snapshot.datasource_id, version],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if already_exists {
            return Ok((version, Vec::new()));
        }

        let next_seq: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(seq), -1) + 1 FROM schema_snapshots WHERE datasource_id = ?1",
                params![snapshot.datasource_id],
                |row| row.get(0),
            )
            .map_err(|e| SchemaError::Backend(e.to_string()))?;

        let snapshot_json =
            serde_json::to_string(&snapshot).map_err(|e| SchemaError::Backend(e.to_string()))?;

        conn.execute(
            "INSERT INTO schema_snapshots (datasource_id, version, seq, snapshot_json) VALUES (?1, ?2, ?3, ?4)",
            params![snapshot.datasource_id, version, next_seq, snapshot_json],
        )
        .map_err(|e| SchemaError::Backend(e.to_string()))?;

        let max_versions = max_versions.max(1) as i64;
        let mut stmt = conn
            .prepare(
                "SELECT version FROM schema_snapshots WHERE datasource_id = ?1 ORDER BY seq ASC",
            )
            .map_err(|e| SchemaError::Backend(e.to_string()))?;
        let all_versions: Vec<String> = stmt
            .query_map(params![snapshot.datasource_id], |row| row.get(0))
            .map_err(|e| SchemaError::Backend(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| SchemaError::Backend(e.to_string()))?;
        drop(stmt);

        let mut evicted = Vec::new();
        let overflow = (all_versions.len() as i64 - max_versions).max(0) as usize;
        for stale_version in &all_versions[..overflow] {
            conn.execute(
                "DELETE FROM schema_snapshots WHERE datasource_id = ?1 AND version = ?2",
                params![snapshot.datasource_id, stale_version],
            )
            .map_err(|e| SchemaError::Backend(e.to_string()))?;
            evicted.push(stale_version.clone());
        }

        Ok((version, evicted))
    }

    fn get_latest_version(&self, datasource_id: &str) -> Result<String, SchemaError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT version FROM schema_snapshots WHERE datasource_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![datasource_id],
            |row| row.get(0),
        )
        .map_err(|_| SchemaError::NoVersions(datasource_id.to_string()))
    }

    fn list_versions(&self, datasource_id: &str) -> Result<Vec<String>, SchemaError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT version FROM schema_snapshots WHERE datasource_id = ?1 ORDER BY seq ASC")
            .map_err(|e| SchemaError::Backend(e.to_string()))?;
        let versions: Vec<String> = stmt
            .query_map(params![datasource_id], |row| row.get(0))
            .map_err(|e| SchemaError::Backend(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| SchemaError::Backend(e.to_string()))?;
        if versions.is_empty() {
            return Err(SchemaError::NoVersions(datasource_id.to_string()));
        }
        Ok(versions)
    }

    fn get_snapshot(&self, datasource_id: &str, version: &str) -> Result<SchemaSnapshot, SchemaError> {
        let conn = self.conn.lock();
        let snapshot_json: String = conn
            .query_row(
                "SELECT snapshot_json FROM schema_snapshots WHERE datasource_id = ?1 AND version = ?2",
                params![datasource_id, version],
                |row| row.get(0),
            )
            .map_err(|_| SchemaError::NotFound {
                datasource_id: datasource_id.to_string(),
                version: version.to_string(),
            })?;
        serde_json::from_str(&snapshot_json).map_err(|e| SchemaError::Backend(e.to_string()))
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

    fn snapshot(table_name: &str) -> SchemaSnapshot {
        SchemaSnapshot {
            datasource_id: "ds1".to_string(),
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
    fn behaves_like_in_memory_store_for_versioning_and_eviction() {
        let store = SqliteSchemaStore::open_in_memory().unwrap();
        store.register_snapshot(snapshot("public.a"), 2).unwrap();
        store.register_snapshot(snapshot("public.b"), 2).unwrap();
        let (_, evicted) = store.register_snapshot(snapshot("public.c"), 2).unwrap();

        assert_eq!(evicted.len(), 1);
        assert_eq!(store.list_versions("ds1").unwrap().len(), 2);
    }

    #[test]
    fn round_trips_a_snapshot() {
        let store = SqliteSchemaStore::open_in_memory().unwrap();
        let (version, _) = store.register_snapshot(snapshot("public.orders"), 5).unwrap();
        let fetched = store.get_snapshot("ds1", &version).unwrap();
        assert_eq!(fetched.contract.tables[0].0, "public.orders");
    }
}
