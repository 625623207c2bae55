//! Closed error-code enum, severity, and the `PipelineError` record (spec §7).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The closed set of error codes a node may attach to a [`PipelineError`].
///
/// Variants are stable for wire/serialization purposes; new codes are added
/// here, never inferred from free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    CapabilityViolation,
    MissingSql,
    MissingDatasourceId,
    MissingLlm,
    IntentViolation,
    SecurityViolation,
    SchemaRetrievalFailed,
    PlanningFailure,
    SqlGenFailed,
    ExecutionFailed,
    ExecutionError,
    ExecutorCrash,
    SafeguardViolation,
    PerformanceWarning,
    ServiceUnavailable,
    InvalidState,
    AggregatorFailed,
    PipelineTimeout,
    Cancelled,
    UnknownError,
}

impl ErrorCode {
    /// Whether this error code is never retryable, regardless of the
    /// retryable bit a node attaches (spec §7: "SECURITY_VIOLATION,
    /// CAPABILITY_VIOLATION, INTENT_VIOLATION are never retryable").
    pub fn always_terminal(self) -> bool {
        matches!(
            self,
            ErrorCode::SecurityViolation
                | ErrorCode::CapabilityViolation
                | ErrorCode::IntentViolation
        )
    }
}

/// Severity of a [`PipelineError`] (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Attached to state; the pipeline continues.
    Warning,
    /// Terminates the current sub-pipeline; may be retryable.
    Error,
    /// Terminates the whole pipeline.
    Critical,
}

/// A tagged error record accumulated in shared graph/subgraph state (spec §3, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineError {
    /// Name of the node that produced this error.
    pub source_node: String,
    /// Short, user/log-safe message. Never contains raw SQL or stack traces.
    pub safe_message: String,
    /// Severity of the error.
    pub severity: Severity,
    /// Closed error code.
    pub error_code: ErrorCode,
    /// Whether the refinement loop may retry after this error.
    pub retryable: bool,
    /// Optional pipeline stage name the error occurred in.
    pub stage: Option<String>,
    /// Optional datasource the error is scoped to.
    pub datasource_id: Option<String>,
    /// Optional structured details (never contains secrets; see `redact`).
    pub details: HashMap<String, String>,
    /// Opaque identifier for correlating an error with audit log entries.
    pub error_id: String,
}

impl PipelineError {
    /// Builds a new error record, computing `retryable` from the error code
    /// unless the code is always terminal (in which case `retryable=false`
    /// always wins, per spec §7).
    pub fn new(
        source_node: impl Into<String>,
        safe_message: impl Into<String>,
        severity: Severity,
        error_code: ErrorCode,
        retryable: bool,
    ) -> Self {
        let retryable = retryable && !error_code.always_terminal();
        Self {
            source_node: source_node.into(),
            safe_message: safe_message.into(),
            severity,
            error_code,
            retryable,
            stage: None,
            datasource_id: None,
            details: HashMap::new(),
            error_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Attaches a pipeline stage name.
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Attaches a datasource id.
    pub fn with_datasource(mut self, datasource_id: impl Into<String>) -> Self {
        self.datasource_id = Some(datasource_id.into());
        self
    }

    /// Attaches a structured detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Builds an `UNKNOWN_ERROR` record for an unexpected panic/exception
    /// caught by a node guard (spec §7: "unexpected exceptions inside a
    /// node are caught by a guard that produces an UNKNOWN_ERROR record").
    pub fn unknown(source_node: impl Into<String>, safe_message: impl Into<String>) -> Self {
        Self::new(
            source_node,
            safe_message,
            Severity::Error,
            ErrorCode::UnknownError,
            false,
        )
    }
}

/// Top-level error type returned by fallible operations in this crate and
/// downstream crates that don't need a full [`PipelineError`] record.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A node or component produced a structured pipeline error.
    #[error("{0:?}")]
    Pipeline(Box<PipelineError>),
    /// Graph construction/compilation error (unknown node, missing entry point, ...).
    #[error("graph error: {0}")]
    Graph(String),
    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Any other error not covered above.
    #[error("{0}")]
    Other(String),
}

impl From<PipelineError> for Error {
    fn from(e: PipelineError) -> Self {
        Error::Pipeline(Box::new(e))
    }
}

/// Convenience result alias used across QueryMesh crates.
pub type Result<T> = std::result::Result<T, Error>;
