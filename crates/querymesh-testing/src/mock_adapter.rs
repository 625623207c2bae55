//! A configurable in-memory [`Adapter`] for exercising the sub-pipeline and
//! orchestrator without a real datasource, grounded in the shape (not the
//! transport) of `dashflow-testing`'s `MockTool`: call history, a
//! fail-next switch, and a builder for canned responses.

use async_trait::async_trait;
use querymesh_adapter::{Adapter, Capability};
use querymesh_core::{AdapterRequest, ColumnSpec, ErrorCode, FrameError, ResultFrame, Severity};
use querymesh_schema::SchemaSnapshot;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A single configured, in-memory data source for tests.
pub struct MockAdapter {
    datasource_id: String,
    dialect: String,
    capabilities: HashSet<Capability>,
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<serde_json::Value>>,
    schema_snapshot: Option<SchemaSnapshot>,
    call_history: Arc<Mutex<Vec<AdapterRequest>>>,
    should_fail: Arc<Mutex<bool>>,
    error_message: String,
}

impl MockAdapter {
    pub fn new(datasource_id: impl Into<String>) -> Self {
        Self {
            datasource_id: datasource_id.into(),
            dialect: "sqlite".to_string(),
            capabilities: HashSet::from([Capability::SupportsSql]),
            columns: Vec::new(),
            rows: Vec::new(),
            schema_snapshot: None,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
            error_message: "mock adapter error".to_string(),
        }
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    /// The row set `execute` returns, regardless of the request it receives.
    pub fn with_rows(mut self, columns: Vec<ColumnSpec>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }

    pub fn with_schema_snapshot(mut self, snapshot: SchemaSnapshot) -> Self {
        self.schema_snapshot = Some(snapshot);
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// Makes the next `execute` call return a failed frame.
    pub fn fail_next(&self) {
        *self.should_fail.lock().unwrap() = true;
    }

    pub fn call_count(&self) -> usize {
        self.call_history.lock().unwrap().len()
    }

    pub fn call_history(&self) -> Vec<AdapterRequest> {
        self.call_history.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.call_history.lock().unwrap().clear();
        *self.should_fail.lock().unwrap() = false;
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn datasource_id(&self) -> &str {
        &self.datasource_id
    }

    fn capabilities(&self) -> HashSet<Capability> {
        self.capabilities.clone()
    }

    async fn connect(&self) -> Result<(), String> {
        Ok(())
    }

    async fn fetch_schema_snapshot(&self) -> Result<SchemaSnapshot, String> {
        self.schema_snapshot.clone().ok_or_else(|| format!("no schema snapshot configured for '{}'", self.datasource_id))
    }

    async fn execute(&self, request: AdapterRequest) -> ResultFrame {
        self.call_history.lock().unwrap().push(request);

        let mut should_fail = self.should_fail.lock().unwrap();
        if *should_fail {
            *should_fail = false;
            return ResultFrame::failure(FrameError {
                error_code: ErrorCode::ExecutionFailed,
                safe_message: self.error_message.clone(),
                severity: Severity::Error,
                retryable: true,
                stage: Some("execute".to_string()),
                datasource_id: Some(self.datasource_id.clone()),
                error_id: None,
            });
        }

        ResultFrame::success(self.columns.clone(), self.rows.clone())
    }

    fn get_dialect(&self) -> &str {
        &self.dialect
    }

    async fn test_connection(&self) -> bool {
        true
    }

    fn get_details(&self) -> HashMap<String, String> {
        HashMap::from([("mock".to_string(), "true".to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querymesh_core::PlanType;

    fn request() -> AdapterRequest {
        AdapterRequest {
            plan_type: PlanType::Sql,
            payload: HashMap::from([("sql".to_string(), serde_json::json!("select 1"))]),
            parameters: HashMap::new(),
            limits: Default::default(),
            trace_id: None,
        }
    }

    #[tokio::test]
    async fn executes_return_the_configured_rows() {
        let adapter = MockAdapter::new("manufacturing")
            .with_rows(vec![ColumnSpec { name: "name".to_string(), data_type: "text".to_string() }], vec![vec![serde_json::json!("acme")]]);
        let frame = adapter.execute(request()).await;
        assert!(frame.success);
        assert_eq!(frame.rows, vec![vec![serde_json::json!("acme")]]);
    }

    #[tokio::test]
    async fn fail_next_returns_a_failed_frame_exactly_once() {
        let adapter = MockAdapter::new("manufacturing").with_error_message("connection reset");
        adapter.fail_next();

        let first = adapter.execute(request()).await;
        assert!(!first.success);
        assert_eq!(first.error.unwrap().safe_message, "connection reset");

        let second = adapter.execute(request()).await;
        assert!(second.success);
    }

    #[tokio::test]
    async fn call_history_records_every_request() {
        let adapter = MockAdapter::new("manufacturing");
        adapter.execute(request()).await;
        adapter.execute(request()).await;
        assert_eq!(adapter.call_count(), 2);
        assert_eq!(adapter.call_history().len(), 2);
    }

    #[tokio::test]
    async fn reset_clears_history_and_fail_flag() {
        let adapter = MockAdapter::new("manufacturing");
        adapter.fail_next();
        adapter.execute(request()).await;
        adapter.reset();

        assert_eq!(adapter.call_count(), 0);
        let frame = adapter.execute(request()).await;
        assert!(frame.success);
    }

    #[test]
    fn capabilities_default_to_sql_support() {
        let adapter = MockAdapter::new("manufacturing");
        assert!(adapter.capabilities().contains(&Capability::SupportsSql));
    }

    #[test]
    fn with_capabilities_overrides_the_default() {
        let adapter = MockAdapter::new("manufacturing").with_capabilities([Capability::SupportsRest]);
        assert!(!adapter.capabilities().contains(&Capability::SupportsSql));
        assert!(adapter.capabilities().contains(&Capability::SupportsRest));
    }

    #[tokio::test]
    async fn fetch_schema_snapshot_without_one_configured_is_an_error() {
        let adapter = MockAdapter::new("manufacturing");
        assert!(adapter.fetch_schema_snapshot().await.is_err());
    }
}
