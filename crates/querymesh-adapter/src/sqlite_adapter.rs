//! A concrete, sqlite-backed [`Adapter`] reference implementation. Used for
//! local development, integration tests, and the `querymesh-testing`
//! harness — not intended as a production warehouse adapter.
//!
//! `rusqlite::Connection` is neither `Send` nor `Sync`; following the
//! worker-thread pattern the teacher repo uses for its own sqlite backend,
//! every statement runs inside `spawn_blocking` against a `Mutex`-guarded
//! connection rather than across an `.await` point.

use crate::adapter::Adapter;
use crate::capability::Capability;
use crate::config::ResolvedDatasourceConfig;
use async_trait::async_trait;
use querymesh_core::{AdapterRequest, ColumnSpec, ErrorCode, FrameError, ResultFrame, Severity};
use querymesh_schema::{Cardinality, ColumnContract, SchemaContract, SchemaMetadata, SchemaSnapshot, TableContract};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A reference adapter over a local sqlite file or in-memory database.
pub struct SqliteAdapter {
    datasource_id: String,
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteAdapter {
    /// Builds an adapter from a resolved config. The `path` connection key
    /// selects a file path; absent or `:memory:` opens an in-memory database.
    pub fn new(config: ResolvedDatasourceConfig) -> Result<Self, String> {
        let path = config
            .connection
            .get("path")
            .map(|s| s.expose().to_string())
            .unwrap_or_else(|| ":memory:".to_string());

        let conn = if path == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| e.to_string())?;

        Ok(Self {
            datasource_id: config.id,
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn datasource_id(&self) -> &str {
        &self.datasource_id
    }

    fn capabilities(&self) -> HashSet<Capability> {
        HashSet::from([
            Capability::SupportsSql,
            Capability::SupportsSchemaIntrospection,
            Capability::SupportsDryRun,
        ])
    }

    async fn connect(&self) -> Result<(), String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            conn.lock()
                .unwrap()
                .execute_batch("PRAGMA foreign_keys = ON;")
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn fetch_schema_snapshot(&self) -> Result<SchemaSnapshot, String> {
        let conn = self.conn.clone();
        let datasource_id = self.datasource_id.clone();
        tokio::task::spawn_blocking(move || fetch_schema_snapshot_blocking(&conn, &datasource_id))
            .await
            .map_err(|e| e.to_string())?
    }

    async fn execute(&self, request: AdapterRequest) -> ResultFrame {
        let conn = self.conn.clone();
        let datasource_id = self.datasource_id.clone();
        let outcome = tokio::task::spawn_blocking(move || execute_blocking(&conn, request)).await;

        match outcome {
            Ok(frame) => frame,
            Err(join_error) => ResultFrame::failure(FrameError {
                error_code: ErrorCode::ExecutorCrash,
                safe_message: "sqlite adapter worker panicked".to_string(),
                severity: Severity::Critical,
                retryable: false,
                stage: Some("execute".to_string()),
                datasource_id: Some(datasource_id),
                error_id: Some(join_error.to_string()),
            }),
        }
    }

    fn get_dialect(&self) -> &str {
        "sqlite"
    }

    async fn test_connection(&self) -> bool {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || conn.lock().unwrap().execute_batch("SELECT 1;").is_ok())
            .await
            .unwrap_or(false)
    }

    fn get_details(&self) -> HashMap<String, String> {
        let mut details = HashMap::new();
        details.insert("engine".to_string(), "sqlite".to_string());
        details
    }
}

fn execute_blocking(conn: &Mutex<rusqlite::Connection>, request: AdapterRequest) -> ResultFrame {
    let sql = match request.payload.get("sql").and_then(|v| v.as_str()) {
        Some(sql) => sql,
        None => {
            return ResultFrame::failure(FrameError {
                error_code: ErrorCode::MissingSql,
                safe_message: "missing 'sql' in adapter request payload".to_string(),
                severity: Severity::Error,
                retryable: false,
                stage: Some("execute".to_string()),
                datasource_id: None,
                error_id: None,
            })
        }
    };

    let guard = conn.lock().unwrap();
    let mut stmt = match guard.prepare(sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            return ResultFrame::failure(FrameError {
                error_code: ErrorCode::ExecutionFailed,
                safe_message: format!("failed to prepare statement: {e}"),
                severity: Severity::Error,
                retryable: false,
                stage: Some("execute".to_string()),
                datasource_id: None,
                error_id: None,
            })
        }
    };

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let row_limit = request.limits.row_limit.unwrap_or(u64::MAX);

    let mut rows = Vec::new();
    let mut truncated = false;
    let query_result = stmt.query_map([], |row| {
        let mut values = Vec::with_capacity(column_names.len());
        for idx in 0..column_names.len() {
            values.push(sqlite_value_to_json(row, idx));
        }
        Ok(values)
    });

    let mapped_rows = match query_result {
        Ok(rows) => rows,
        Err(e) => {
            return ResultFrame::failure(FrameError {
                error_code: ErrorCode::ExecutionFailed,
                safe_message: format!("query execution failed: {e}"),
                severity: Severity::Error,
                retryable: false,
                stage: Some("execute".to_string()),
                datasource_id: None,
                error_id: None,
            })
        }
    };

    for row in mapped_rows {
        if rows.len() as u64 >= row_limit {
            truncated = true;
            break;
        }
        match row {
            Ok(values) => rows.push(values),
            Err(e) => {
                return ResultFrame::failure(FrameError {
                    error_code: ErrorCode::ExecutionFailed,
                    safe_message: format!("row decode failed: {e}"),
                    severity: Severity::Error,
                    retryable: false,
                    stage: Some("execute".to_string()),
                    datasource_id: None,
                    error_id: None,
                })
            }
        }
    }

    let columns = column_names
        .into_iter()
        .map(|name| ColumnSpec { name, data_type: "string".to_string() })
        .collect();

    let mut frame = ResultFrame::success(columns, rows);
    frame.truncated = truncated;
    frame
}

fn sqlite_value_to_json(row: &rusqlite::Row<'_>, idx: usize) -> serde_json::Value {
    use rusqlite::types::ValueRef;
    match row.get_ref_unwrap(idx) {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(_) => serde_json::Value::String("<blob>".to_string()),
    }
}

fn fetch_schema_snapshot_blocking(
    conn: &Mutex<rusqlite::Connection>,
    datasource_id: &str,
) -> Result<SchemaSnapshot, String> {
    let guard = conn.lock().unwrap();
    let mut table_stmt = guard
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'")
        .map_err(|e| e.to_string())?;
    let table_names: Vec<String> = table_stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| e.to_string())?
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;
    drop(table_stmt);

    let mut tables = Vec::with_capacity(table_names.len());
    for table_name in &table_names {
        let mut column_stmt = guard
            .prepare(&format!("PRAGMA table_info({table_name})"))
            .map_err(|e| e.to_string())?;
        let columns: Vec<ColumnContract> = column_stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let data_type: String = row.get(2)?;
                let notnull: i64 = row.get(3)?;
                let pk: i64 = row.get(5)?;
                Ok(ColumnContract {
                    name,
                    data_type,
                    nullable: notnull == 0,
                    primary_key: pk != 0,
                })
            })
            .map_err(|e| e.to_string())?
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?;
        drop(column_stmt);

        let mut fk_stmt = guard
            .prepare(&format!("PRAGMA foreign_key_list({table_name})"))
            .map_err(|e| e.to_string())?;
        let foreign_keys: Vec<ForeignKeyRow> = fk_stmt
            .query_map([], |row| {
                Ok(ForeignKeyRow {
                    table: row.get(2)?,
                    from: row.get(3)?,
                    to: row.get(4)?,
                })
            })
            .map_err(|e| e.to_string())?
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?;

        let foreign_keys = foreign_keys
            .into_iter()
            .map(|fk| querymesh_schema::ForeignKeyContract {
                columns: vec![fk.from],
                references_table: fk.table,
                references_columns: vec![fk.to],
                cardinality: Cardinality::ManyToOne,
            })
            .collect();

        tables.push((table_name.clone(), TableContract { columns, foreign_keys }));
    }

    Ok(SchemaSnapshot {
        datasource_id: datasource_id.to_string(),
        contract: SchemaContract { tables },
        metadata: SchemaMetadata::default(),
    })
}

struct ForeignKeyRow {
    table: String,
    from: String,
    to: String,
}
