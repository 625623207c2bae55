//! Bridges the async [`Adapter::execute`] call into the sandbox's sync
//! submission closure. `Sandbox::submit`/`WorkerPool::submit` already run
//! their closure on a dedicated `spawn_blocking` thread, never the async
//! reactor, so nesting a blocking wait on another future here is safe: it
//! cannot stall other tasks.

use querymesh_adapter::Adapter;
use querymesh_core::{AdapterRequest, ExecutionLimits, PlanType, ResultFrame};
use querymesh_sandbox::{ExecutionMode, ExecutionRequest, ExecutionResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the [`ExecutionRequest`] a sandbox submission carries for `sql`
/// under `mode`, with the adapter's row limit ceiling applied.
pub fn execution_request(mode: ExecutionMode, datasource_id: &str, engine_type: &str, sql: &str, limits: ExecutionLimits) -> ExecutionRequest {
    ExecutionRequest {
        mode,
        datasource_id: datasource_id.to_string(),
        engine_type: engine_type.to_string(),
        connection_args: HashMap::new(),
        sql: Some(sql.to_string()),
        parameters: HashMap::new(),
        limits,
    }
}

/// Runs inside a sandbox worker: drives `adapter.execute` to completion via
/// `block_on` and translates the resulting [`ResultFrame`] into an
/// [`ExecutionResult`]. `mode` is conveyed to the adapter as an extra
/// payload flag; an adapter that ignores it (reference adapters are not
/// obligated to implement true dry-run semantics) simply executes for real.
pub fn execute_via_adapter(adapter: &Arc<dyn Adapter>, request: &ExecutionRequest) -> ExecutionResult {
    let Some(sql) = request.sql.clone() else {
        return ExecutionResult { success: false, data: None, error: Some("missing sql".to_string()), metrics: HashMap::new() };
    };

    let mut payload = HashMap::new();
    payload.insert("sql".to_string(), serde_json::Value::String(sql));
    match request.mode {
        ExecutionMode::DryRun => {
            payload.insert("dry_run".to_string(), serde_json::Value::Bool(true));
        }
        ExecutionMode::CostEstimate => {
            payload.insert("cost_estimate".to_string(), serde_json::Value::Bool(true));
        }
        ExecutionMode::SqlExecution | ExecutionMode::SchemaIntrospection => {}
    }

    let adapter_request = AdapterRequest {
        plan_type: PlanType::Sql,
        payload,
        parameters: request.parameters.clone(),
        limits: request.limits,
        trace_id: None,
    };

    let frame = tokio::runtime::Handle::current().block_on(adapter.execute(adapter_request));
    result_from_frame(frame)
}

fn result_from_frame(frame: ResultFrame) -> ExecutionResult {
    if frame.success {
        let metrics = frame.execution_stats.clone();
        let data = serde_json::to_value(&frame).ok();
        ExecutionResult { success: true, data, error: None, metrics }
    } else {
        let message = frame.error.as_ref().map(|e| e.safe_message.clone());
        ExecutionResult { success: false, data: None, error: message, metrics: HashMap::new() }
    }
}
