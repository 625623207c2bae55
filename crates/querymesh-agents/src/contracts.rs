//! Typed request/response contracts for every LLM-backed node (spec §4.12,
//! §4.9).

use querymesh_core::Plan;
use serde::{Deserialize, Serialize};

/// Why the Intent Validator classified a query as unsafe (spec §4.9 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    Jailbreak,
    PiiExfiltration,
    Destructive,
    SystemProbing,
}

/// The Intent Validator's structured output.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntentValidationResult {
    pub is_safe: bool,
    #[serde(default)]
    pub violation_category: Option<ViolationCategory>,
    pub reasoning: String,
}

/// One sub-query as drafted by the Decomposer, before the Global Planner
/// places it in the execution DAG.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubQueryDraft {
    pub id: String,
    #[serde(default)]
    pub datasource_id: Option<String>,
    pub intent: String,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub expected_columns: Vec<String>,
}

/// A declared grouping of sub-query outputs to be combined (spec §3
/// "Combine group / post-combine op").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CombineGroupDraft {
    pub id: String,
    pub op: String,
    pub inputs: Vec<String>,
}

/// A post-combine relational operator applied after a combine group.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostCombineOpDraft {
    pub id: String,
    pub op: String,
    pub inputs: Vec<String>,
}

/// The Decomposer's structured output (spec §4.9 step 3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecomposerResponse {
    pub sub_queries: Vec<SubQueryDraft>,
    #[serde(default)]
    pub combine_groups: Vec<CombineGroupDraft>,
    #[serde(default)]
    pub post_combine_ops: Vec<PostCombineOpDraft>,
    #[serde(default)]
    pub unmapped_subqueries: Vec<String>,
}

/// The kind of a node in the execution DAG (spec §3 "Execution DAG").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagNodeKind {
    Scan,
    Combine,
    PostFilter,
    Project,
    GroupAgg,
    OrderLimit,
}

/// Where a DAG node's input comes from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Scan,
    Step,
}

/// One input reference a DAG node consumes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DagInput {
    pub source: InputSource,
    pub id: String,
}

/// One node of the precomputed execution DAG (spec §3).
///
/// `params` carries the operator-specific arguments the engine aggregator
/// needs beyond `kind`/`inputs`/`output_schema` (e.g. a combine node's
/// `op: "union"|"join"` and join keys, a filter's predicate, a group-agg's
/// keys and aggregate functions, an order-limit's sort keys and limit).
/// Kept as a loose JSON value rather than a per-kind struct so a planner
/// that only partially fills in a node's operator arguments still
/// round-trips; the engine aggregator treats missing keys as their
/// documented default (spec §4.9 step 6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DagNode {
    pub id: String,
    pub kind: DagNodeKind,
    #[serde(default)]
    pub inputs: Vec<DagInput>,
    pub output_schema: Vec<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The Global Planner's structured output: the execution DAG over
/// sub-queries and combine/post-combine ops (spec §4.9 step 4). The
/// orchestrator computes `layers` itself once it has the node/edge set —
/// the model is not trusted to emit a valid topological layering.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionDagDraft {
    pub nodes: Vec<DagNode>,
}

/// The AST Planner's structured output is the typed [`Plan`] itself
/// (spec §3, §4.8 step 2) — no separate wrapper type, so a parse failure
/// and a structural-validation failure are both caught before the plan
/// reaches the Logical Validator.
pub type PlanModel = Plan;

/// How the Answer Synthesizer's output should be rendered (spec §4.9 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerFormat {
    Table,
    List,
    Text,
}

/// The Answer Synthesizer's structured output: the final user-visible
/// answer (spec §4.9 step 7).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatedResponse {
    pub summary: String,
    pub format_type: AnswerFormat,
    pub content: serde_json::Value,
    #[serde(default)]
    pub warnings: Vec<String>,
}
