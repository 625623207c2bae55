//! Cross-process wire types shared by the adapter contract, the sandbox,
//! and the artifact store (spec §6 "External interfaces").

use crate::error::{ErrorCode, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The shape of the payload an adapter is asked to execute (spec §4.1,
/// §6). `plan_type` determines which of `payload`'s keys are meaningful;
/// an adapter that receives a `plan_type` it does not support must reject
/// the request with `CAPABILITY_VIOLATION` rather than attempt it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterRequest {
    pub plan_type: PlanType,
    pub payload: HashMap<String, serde_json::Value>,
    pub parameters: HashMap<String, serde_json::Value>,
    pub limits: ExecutionLimits,
    pub trace_id: Option<String>,
}

/// The wire-level plan type tag (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Sql,
    Rest,
    Nosql,
}

/// Safeguard ceilings attached to a single execution (spec §3 "Adapter
/// instance", §6 `limits`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub row_limit: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub max_bytes: Option<u64>,
}

/// One column in a [`ResultFrame`]'s schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: String,
}

/// A safe-to-render error attached to a failed [`ResultFrame`] (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameError {
    pub error_code: ErrorCode,
    pub safe_message: String,
    pub severity: Severity,
    pub retryable: bool,
    pub stage: Option<String>,
    pub datasource_id: Option<String>,
    pub error_id: Option<String>,
}

/// The typed result of an adapter execution (spec §4.1, §6). `execute` must
/// never raise; runtime failures are represented as `success: false` with
/// `error` populated, never as a propagated exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultFrame {
    pub success: bool,
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: u64,
    pub truncated: bool,
    pub bytes: Option<u64>,
    pub datasource_id: Option<String>,
    pub tenant_id: Option<String>,
    pub execution_stats: HashMap<String, serde_json::Value>,
    pub error: Option<FrameError>,
}

impl ResultFrame {
    /// Builds a successful frame from columns and rows; `row_count` is
    /// derived, `truncated` defaults to `false`.
    pub fn success(columns: Vec<ColumnSpec>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        let row_count = rows.len() as u64;
        Self {
            success: true,
            columns,
            rows,
            row_count,
            truncated: false,
            bytes: None,
            datasource_id: None,
            tenant_id: None,
            execution_stats: HashMap::new(),
            error: None,
        }
    }

    /// Builds a failed frame carrying `error`. Per spec §4.1, `execute`
    /// signals failure this way rather than by raising.
    pub fn failure(error: FrameError) -> Self {
        Self {
            success: false,
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
            bytes: None,
            datasource_id: None,
            tenant_id: None,
            execution_stats: HashMap::new(),
            error: Some(error),
        }
    }
}
