//! QueryMesh graph engine, runtime, and observability primitives.
//!
//! This crate provides the shared machinery both the sub-query execution
//! sub-pipeline and the top-level orchestrator build on: a typed graph
//! engine (`Node`/`StateGraph`/`MergeableState`), the closed error-code
//! vocabulary, cooperative cancellation and deadlines, the audit event
//! logger, and metrics.

pub mod error;
pub mod frame;
pub mod graph;
pub mod node;
pub mod observability;
pub mod plan;
pub mod runtime;
pub mod state;

pub use error::{Error, ErrorCode, PipelineError, Result, Severity};
pub use frame::{AdapterRequest, ColumnSpec, ExecutionLimits, FrameError, PlanType, ResultFrame};
pub use graph::{CompiledGraph, StateGraph, END};
pub use node::{FnNode, Node};
pub use observability::{Metrics, NodeTimer};
pub use plan::{
    Expr, JoinSpec, JoinType, OrderByItem, Plan, PlanValidationError, QueryType, SelectItem,
    TableRef, WhenClause,
};
pub use runtime::{
    AuditLogger, AuditRecord, AuditSink, CancellationFlag, Deadline, MemoryAuditSink,
    TerminationReason, TracingAuditSink,
};
pub use state::{GraphState, MergeableState};
