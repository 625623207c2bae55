//! Wire types for sandbox submissions (spec §4.6).

use querymesh_core::ExecutionLimits;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a submission asks the sandbox to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// A full SQL execution against the target engine.
    SqlExecution,
    /// A dry-run / explain-only validation.
    DryRun,
    /// A cost/row-count estimate without materializing results.
    CostEstimate,
    /// Schema introspection (routed to the indexing pool, not interactive).
    SchemaIntrospection,
}

impl ExecutionMode {
    /// Whether this mode belongs on the indexing pool rather than the
    /// interactive pool (spec §4.6: "Indexing pool... schema introspection
    /// only").
    pub fn is_indexing(self) -> bool {
        matches!(self, ExecutionMode::SchemaIntrospection)
    }
}

/// A self-contained submission to a sandbox worker (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub mode: ExecutionMode,
    pub datasource_id: String,
    pub engine_type: String,
    pub connection_args: HashMap<String, String>,
    pub sql: Option<String>,
    pub parameters: HashMap<String, serde_json::Value>,
    pub limits: ExecutionLimits,
}

/// The result of a sandbox submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub metrics: HashMap<String, serde_json::Value>,
}

impl ExecutionResult {
    /// Builds the crash-translated result for a worker that died mid-call
    /// (panic, or — in a true process-isolated deployment — segfault/OOM),
    /// per spec §4.6's `SANDBOX CRASH` translation.
    pub fn sandbox_crash(detail: &str) -> Self {
        let mut metrics = HashMap::new();
        metrics.insert("is_crash".to_string(), serde_json::json!(1));
        Self {
            success: false,
            data: None,
            error: Some(format!("SANDBOX CRASH: {detail}")),
            metrics,
        }
    }

    /// Builds the result for a submission that exceeded its hard deadline.
    pub fn timed_out() -> Self {
        Self {
            success: false,
            data: None,
            error: Some("execution deadline exceeded".to_string()),
            metrics: HashMap::new(),
        }
    }

    /// Whether this result represents a crash, per the `metrics.is_crash`
    /// convention (spec §4.6, §8 scenario e).
    pub fn is_crash(&self) -> bool {
        self.metrics.get("is_crash").and_then(serde_json::Value::as_i64) == Some(1)
    }
}
