//! The process-wide execution sandbox: two worker pools plus the three
//! global circuit breakers, constructed once and held for the process
//! lifetime (spec §4.6, §9 "Global state").

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::pool::WorkerPool;
use crate::types::{ExecutionMode, ExecutionRequest, ExecutionResult};
use querymesh_core::AuditLogger;
use std::sync::Arc;
use std::time::Duration;

/// Bundles the two worker pools and three circuit breakers the rest of the
/// system submits work through.
pub struct Sandbox {
    interactive_pool: WorkerPool,
    indexing_pool: WorkerPool,
    pub llm_breaker: Arc<CircuitBreaker>,
    pub vector_breaker: Arc<CircuitBreaker>,
    pub db_breaker: Arc<CircuitBreaker>,
}

impl Sandbox {
    /// Builds a sandbox with the spec-default pool sizes and breaker
    /// parameters, wiring every breaker to `audit` for state-change events.
    pub fn new(audit: Arc<AuditLogger>) -> Self {
        Self {
            interactive_pool: WorkerPool::interactive_default(),
            indexing_pool: WorkerPool::indexing_default(),
            llm_breaker: Arc::new(CircuitBreaker::llm_defaults().with_audit_logger(audit.clone())),
            vector_breaker: Arc::new(CircuitBreaker::vector_defaults().with_audit_logger(audit.clone())),
            db_breaker: Arc::new(CircuitBreaker::db_defaults().with_audit_logger(audit)),
        }
    }

    /// Submits `request` to the appropriate pool, guarded by the database
    /// breaker. `execute` is the closure that actually talks to the engine
    /// (e.g. via a real `Adapter`); it runs on a blocking-thread slot.
    pub async fn submit(
        &self,
        request: ExecutionRequest,
        deadline: Duration,
        execute: impl FnOnce(&ExecutionRequest) -> ExecutionResult + Send + 'static,
    ) -> ExecutionResult {
        let pool = if request.mode.is_indexing() { &self.indexing_pool } else { &self.interactive_pool };

        let breaker_result = self
            .db_breaker
            .guard(is_soft_execution_error, async {
                let result = pool.submit(deadline, move || execute(&request)).await;
                if result.success {
                    Ok(result)
                } else {
                    Err(result)
                }
            })
            .await;

        match breaker_result {
            Ok(result) => result,
            Err(BreakerError::Open(name)) => service_unavailable(&name),
            Err(BreakerError::Inner(result)) => result,
        }
    }

    /// Waits for in-flight submissions on both pools to drain. Intended to
    /// be invoked once at process shutdown (spec §4.6 "Pool shutdown is
    /// atexit-driven").
    pub async fn shutdown(&self) {
        tokio::join!(self.interactive_pool.shutdown(), self.indexing_pool.shutdown());
    }
}

/// The database breaker excludes no error classes (only the LLM breaker in
/// the original implementation carries a soft-error exclusion list).
fn is_soft_execution_error(_: &ExecutionResult) -> bool {
    false
}

fn service_unavailable(breaker_name: &str) -> ExecutionResult {
    let mut metrics = std::collections::HashMap::new();
    metrics.insert("breaker".to_string(), serde_json::json!(breaker_name));
    ExecutionResult {
        success: false,
        data: None,
        error: Some(format!("SERVICE_UNAVAILABLE: breaker '{breaker_name}' is open")),
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querymesh_core::{ExecutionLimits, MemoryAuditSink};

    fn request(mode: ExecutionMode) -> ExecutionRequest {
        ExecutionRequest {
            mode,
            datasource_id: "ds1".to_string(),
            engine_type: "postgres".to_string(),
            connection_args: Default::default(),
            sql: Some("SELECT 1".to_string()),
            parameters: Default::default(),
            limits: ExecutionLimits::default(),
        }
    }

    #[tokio::test]
    async fn routes_schema_introspection_to_the_indexing_pool() {
        let audit = Arc::new(AuditLogger::new(Arc::new(MemoryAuditSink::default())));
        let sandbox = Sandbox::new(audit);
        let result = sandbox
            .submit(request(ExecutionMode::SchemaIntrospection), Duration::from_secs(1), |_| ExecutionResult {
                success: true,
                data: None,
                error: None,
                metrics: Default::default(),
            })
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn repeated_crashes_trip_the_breaker_to_service_unavailable() {
        let audit = Arc::new(AuditLogger::new(Arc::new(MemoryAuditSink::default())));
        let sandbox = Sandbox::new(audit);

        for _ in 0..5 {
            let result = sandbox
                .submit(request(ExecutionMode::SqlExecution), Duration::from_secs(1), |_| {
                    ExecutionResult::sandbox_crash("worker terminated")
                })
                .await;
            assert!(result.is_crash());
        }

        let result = sandbox
            .submit(request(ExecutionMode::SqlExecution), Duration::from_secs(1), |_| ExecutionResult {
                success: true,
                data: None,
                error: None,
                metrics: Default::default(),
            })
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("SERVICE_UNAVAILABLE"));
    }
}
