//! Shared graph state and the append/last-writer merge reducer (spec §3, §9).
//!
//! Nodes never mutate shared state directly; they return a delta of the
//! same type, and the graph engine merges it into the running state with
//! per-field policy: lists append, maps union by key, scalars last-write.
//! This mirrors `dashflow`'s `MergeableState` trait (`crates/dashflow/src/api.rs`)
//! and the `Annotated[List[T], operator.add]` convention in the original
//! Python `GraphState` model.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Implemented by any state type carried through a [`crate::graph::StateGraph`].
///
/// `merge` folds `other` (a node's returned delta) into `self` (the
/// accumulated state) in place.
pub trait MergeableState: Clone + Send + Sync + 'static {
    /// Merge `other` into `self` using this state's field policies.
    fn merge(&mut self, other: &Self);
}

/// Appends `other` onto `target`, the canonical list-merge policy.
pub fn append_merge<T: Clone>(target: &mut Vec<T>, other: &[T]) {
    target.extend_from_slice(other);
}

/// Unions `other` into `target` by key; `other`'s entries win on key
/// collision, matching single-writer-per-key semantics for maps.
pub fn union_merge<K: std::hash::Hash + Eq + Clone, V: Clone>(
    target: &mut HashMap<K, V>,
    other: &HashMap<K, V>,
) {
    for (k, v) in other {
        target.insert(k.clone(), v.clone());
    }
}

/// The shared dictionary threaded through the top-level orchestrator
/// (spec §3 "Graph state").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphState {
    /// Per-request trace id, propagated through logs/metrics/artifact URIs.
    pub trace_id: String,
    /// Tenant id for this request.
    pub tenant_id: String,
    /// Original natural-language user query.
    pub user_query: String,
    /// Roles held by the caller, immutable for the request.
    pub user_roles: Vec<String>,
    /// Intermediate textual/structured responses from every node, keyed by node name.
    pub node_responses: HashMap<String, serde_json::Value>,
    /// `sub_query_id -> ArtifactRef` (serialized as JSON to avoid a cyclic
    /// dependency on `querymesh-artifacts`; deserialized by the orchestrator).
    pub artifact_refs: HashMap<String, serde_json::Value>,
    /// Sub-graph outputs keyed by sub_query_id.
    pub subgraph_outputs: HashMap<String, serde_json::Value>,
    /// Flat, append-only error list.
    pub errors: Vec<PipelineError>,
    /// Reasoning log entries, append-only.
    pub reasoning: Vec<String>,
    /// Distinct system events, append-only.
    pub system_events: Vec<String>,
    /// Final synthesized answer, set once by the Answer Synthesizer.
    pub final_answer: Option<serde_json::Value>,
}

impl GraphState {
    /// Creates a fresh state for a new request.
    pub fn new(trace_id: impl Into<String>, tenant_id: impl Into<String>, user_query: impl Into<String>, user_roles: Vec<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            tenant_id: tenant_id.into(),
            user_query: user_query.into(),
            user_roles,
            ..Default::default()
        }
    }

    /// Appends a single error to the error list.
    pub fn push_error(&mut self, error: PipelineError) {
        self.errors.push(error);
    }

    /// True if any accumulated error has [`crate::error::Severity::Critical`].
    pub fn has_critical_error(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e.severity, crate::error::Severity::Critical))
    }
}

impl MergeableState for GraphState {
    fn merge(&mut self, other: &Self) {
        // Scalars: last-writer-wins, only overwritten when the delta set them
        // to something non-default. trace_id/tenant_id/user_query/user_roles
        // are fixed at request start and never appear in a delta.
        if !other.user_query.is_empty() {
            self.user_query = other.user_query.clone();
        }
        if other.final_answer.is_some() {
            self.final_answer = other.final_answer.clone();
        }

        // Maps: union by key.
        union_merge(&mut self.node_responses, &other.node_responses);
        union_merge(&mut self.artifact_refs, &other.artifact_refs);
        union_merge(&mut self.subgraph_outputs, &other.subgraph_outputs);

        // Lists: append-only.
        append_merge(&mut self.errors, &other.errors);
        append_merge(&mut self.reasoning, &other.reasoning);
        append_merge(&mut self.system_events, &other.system_events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, Severity};

    #[test]
    fn merge_appends_lists_and_unions_maps() {
        let mut base = GraphState::new("trace-1", "tenant-1", "q", vec!["admin".into()]);
        base.errors.push(PipelineError::new(
            "n1",
            "first",
            Severity::Warning,
            ErrorCode::PerformanceWarning,
            false,
        ));

        let mut delta = GraphState::default();
        delta.errors.push(PipelineError::new(
            "n2",
            "second",
            Severity::Error,
            ErrorCode::PlanningFailure,
            true,
        ));
        delta
            .artifact_refs
            .insert("sq-1".into(), serde_json::json!({"uri": "a"}));

        base.merge(&delta);

        assert_eq!(base.errors.len(), 2);
        assert_eq!(base.errors[0].source_node, "n1");
        assert_eq!(base.errors[1].source_node, "n2");
        assert_eq!(base.artifact_refs.len(), 1);
        // Fields fixed at request creation are untouched by an empty-scalar delta.
        assert_eq!(base.trace_id, "trace-1");
    }

    #[test]
    fn merge_two_layers_is_commutative_within_a_layer() {
        // Spec §5: sub-queries within a layer have no inter-ordering; merging
        // two disjoint deltas in either order must yield the same map.
        let mut a = GraphState::default();
        a.artifact_refs.insert("sq-1".into(), serde_json::json!(1));
        let mut b = GraphState::default();
        b.artifact_refs.insert("sq-2".into(), serde_json::json!(2));

        let mut merged_ab = GraphState::default();
        merged_ab.merge(&a);
        merged_ab.merge(&b);

        let mut merged_ba = GraphState::default();
        merged_ba.merge(&b);
        merged_ba.merge(&a);

        assert_eq!(merged_ab.artifact_refs.len(), 2);
        assert_eq!(merged_ba.artifact_refs.len(), 2);
        assert_eq!(
            merged_ab.artifact_refs.get("sq-1"),
            merged_ba.artifact_refs.get("sq-1")
        );
    }
}
