//! The sub-pipeline's shared state, threaded through the per-sub-query
//! state machine (spec §4.8), and the `SubQuery` type it operates over
//! (spec §3 "Sub-query").

use querymesh_artifacts::ArtifactRef;
use querymesh_core::{MergeableState, PipelineError, Plan};
use serde::{Deserialize, Serialize};

/// One sub-query, as handed to the sub-pipeline by the orchestrator's
/// Decomposer/Global Planner (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuery {
    pub id: String,
    pub datasource_id: String,
    pub intent: String,
    pub metrics: Vec<String>,
    pub filters: Vec<String>,
    pub group_by: Vec<String>,
    pub expected_columns: Vec<String>,
}

/// A table retrieved for the planner's prompt: name plus the column names
/// visible within it (spec §4.8 step 1 "Output: an ordered list of
/// `Table{name, columns[]}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedTable {
    pub name: String,
    pub columns: Vec<String>,
}

/// The state machine's current stage (spec §4.8 "State machine").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubPipelineStage {
    Started,
    SchemaRetrieved,
    AstPlanned,
    LogicallyValid,
    SqlGenerated,
    PhysicallyValid,
    Executed,
    Failed,
}

impl Default for SubPipelineStage {
    fn default() -> Self {
        SubPipelineStage::Started
    }
}

/// Terminal or in-flight status of a sub-pipeline run, surfaced to the
/// orchestrator as part of `SubgraphOutput` (spec §4.9 "Fan-out / join
/// semantics").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubPipelineStatus {
    Running,
    Executed,
    Failed,
}

impl Default for SubPipelineStatus {
    fn default() -> Self {
        SubPipelineStatus::Running
    }
}

/// Shared state threaded through the sub-query execution state machine
/// (spec §4.8). Nodes return sparse deltas; see [`querymesh_core::Node`]'s
/// contract and [`MergeableState::merge`] below for the per-field policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubPipelineState {
    pub sub_query: Option<SubQuery>,
    pub user_roles: Vec<String>,
    pub trace_id: String,
    pub tenant_id: String,
    pub request_id: String,
    pub subgraph_name: String,

    pub schema_tables: Vec<RetrievedTable>,
    pub schema_version: Option<String>,
    pub plan: Option<Plan>,
    pub sql: Option<String>,
    pub artifact_ref: Option<ArtifactRef>,

    pub errors: Vec<PipelineError>,
    pub reasoning: Vec<String>,

    pub retry_count: usize,
    /// Set fresh by the node that just ran; `None` means that node judged
    /// its own output error-free. Distinct from `errors` (which accumulates
    /// across the whole run) so the retry router can ask "did the stage
    /// that just ran fail?" without re-scanning history.
    pub last_error: Option<PipelineError>,
    pub stage: SubPipelineStage,
    pub status: SubPipelineStatus,
}

impl SubPipelineState {
    /// Builds the initial state for a fresh sub-pipeline invocation.
    pub fn new(
        sub_query: SubQuery,
        user_roles: Vec<String>,
        trace_id: impl Into<String>,
        tenant_id: impl Into<String>,
        request_id: impl Into<String>,
        subgraph_name: impl Into<String>,
    ) -> Self {
        Self {
            sub_query: Some(sub_query),
            user_roles,
            trace_id: trace_id.into(),
            tenant_id: tenant_id.into(),
            request_id: request_id.into(),
            subgraph_name: subgraph_name.into(),
            ..Default::default()
        }
    }

    /// The datasource id of the held sub-query, if any. Nodes that require
    /// one before proceeding look here.
    pub fn datasource_id(&self) -> Option<&str> {
        self.sub_query.as_ref().map(|s| s.datasource_id.as_str())
    }
}

impl MergeableState for SubPipelineState {
    fn merge(&mut self, other: &Self) {
        // Scalars fixed at construction never reappear in a delta, so
        // there's nothing to do for sub_query/user_roles/trace_id/tenant_id/
        // request_id/subgraph_name beyond what `new` already set.

        if other.schema_version.is_some() {
            self.schema_version = other.schema_version.clone();
        }
        if !other.schema_tables.is_empty() {
            self.schema_tables = other.schema_tables.clone();
        }
        if other.plan.is_some() {
            self.plan = other.plan.clone();
        }
        if other.sql.is_some() {
            self.sql = other.sql.clone();
        }
        if other.artifact_ref.is_some() {
            self.artifact_ref = other.artifact_ref.clone();
        }

        querymesh_core::state::append_merge(&mut self.errors, &other.errors);
        querymesh_core::state::append_merge(&mut self.reasoning, &other.reasoning);

        if other.retry_count > self.retry_count {
            self.retry_count = other.retry_count;
        }
        // A delta always carries an explicit verdict for the stage that ran
        // (Some(error) or None for "clean"), so last_error is a plain
        // replace rather than an append/union.
        self.last_error = other.last_error.clone();

        if other.stage != SubPipelineStage::Started {
            self.stage = other.stage;
        }
        if other.status != SubPipelineStatus::Running {
            self.status = other.status;
        }
    }
}
