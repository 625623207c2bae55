//! A small sequential/conditional state-graph engine, grounded in
//! `dashflow`'s `StateGraph`/`CompiledGraph`/`END` (`crates/dashflow/src/api.rs`,
//! `crates/dashflow/src/checkpoint.rs` doc example).
//!
//! This engine drives the per-sub-query state machine (spec §4.8: a linear
//! chain with a conditional retry edge back to the planner). The top-level
//! orchestrator's *parallel* layer fan-out (spec §4.9 Layer Router) is a
//! distinct concern and is implemented directly with `tokio::task::JoinSet`
//! in `querymesh-orchestrator`, not through this sequential engine — the two
//! have genuinely different shapes (static linear-with-retry vs. dynamic
//! parallel-by-DAG-layer).

use crate::error::{Error, Result};
use crate::node::Node;
use crate::state::MergeableState;
use std::collections::HashMap;
use std::sync::Arc;

/// Sentinel name for the terminal node, mirroring `dashflow::END`.
pub const END: &str = "__end__";

type Router<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

enum Edge<S> {
    Direct(String),
    Conditional(Router<S>),
}

/// Builder for a [`CompiledGraph`].
pub struct StateGraph<S: MergeableState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    entry_point: Option<String>,
    max_steps: usize,
}

impl<S: MergeableState> Default for StateGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: MergeableState> StateGraph<S> {
    /// Creates an empty graph with a generous default step ceiling
    /// (belt-and-suspenders against a misconfigured routing cycle; the
    /// real retry ceiling in spec §4.8/§8 is enforced by the refiner loop
    /// itself, not by this counter).
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry_point: None,
            max_steps: 256,
        }
    }

    /// Registers a node under `name`.
    pub fn add_node(&mut self, name: impl Into<String>, node: Arc<dyn Node<S>>) -> &mut Self {
        self.nodes.insert(name.into(), node);
        self
    }

    /// Adds an unconditional edge `from -> to`. `to` may be [`END`].
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.insert(from.into(), Edge::Direct(to.into()));
        self
    }

    /// Adds a conditional edge: after `from` runs, `router` inspects the
    /// merged state and returns the next node name (or [`END`]).
    pub fn add_conditional_edge<F>(&mut self, from: impl Into<String>, router: F) -> &mut Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
    {
        self.edges
            .insert(from.into(), Edge::Conditional(Arc::new(router)));
        self
    }

    /// Sets the node execution starts from.
    pub fn set_entry_point(&mut self, name: impl Into<String>) -> Result<&mut Self> {
        let name = name.into();
        if !self.nodes.contains_key(&name) {
            return Err(Error::Graph(format!("unknown entry point node: {name}")));
        }
        self.entry_point = Some(name);
        Ok(self)
    }

    /// Validates the graph and returns an executable [`CompiledGraph`].
    pub fn compile(self) -> Result<CompiledGraph<S>> {
        let entry_point = self
            .entry_point
            .clone()
            .ok_or_else(|| Error::Graph("no entry point set".into()))?;
        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(Error::Graph(format!("edge from unknown node: {from}")));
            }
            if let Edge::Direct(to) = edge {
                if to != END && !self.nodes.contains_key(to) {
                    return Err(Error::Graph(format!("edge to unknown node: {to}")));
                }
            }
        }
        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry_point,
            max_steps: self.max_steps,
        })
    }
}

/// A compiled, runnable graph.
pub struct CompiledGraph<S: MergeableState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    entry_point: String,
    max_steps: usize,
}

impl<S: MergeableState> CompiledGraph<S> {
    /// Runs the graph to completion starting from `initial`, merging each
    /// node's delta into the running state and following edges (direct or
    /// conditional) until [`END`] or the step ceiling is hit.
    pub async fn invoke(&self, initial: S) -> Result<S> {
        let mut state = initial;
        let mut current = self.entry_point.clone();
        let mut steps = 0usize;

        loop {
            if current == END {
                break;
            }
            steps += 1;
            if steps > self.max_steps {
                return Err(Error::Graph(format!(
                    "graph exceeded max_steps={} without reaching END (possible routing cycle)",
                    self.max_steps
                )));
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| Error::Graph(format!("no such node: {current}")))?;

            tracing::debug!(node = %node.name(), step = steps, "executing graph node");
            let delta = node.execute(&state).await?;
            state.merge(&delta);

            current = match self.edges.get(&current) {
                Some(Edge::Direct(to)) => to.clone(),
                Some(Edge::Conditional(router)) => router(&state),
                None => END.to_string(),
            };
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, PipelineError, Severity};
    use crate::node::FnNode;
    use crate::state::GraphState;

    #[tokio::test]
    async fn linear_chain_runs_in_order() {
        let mut graph: StateGraph<GraphState> = StateGraph::new();
        graph.add_node(
            "step1",
            Arc::new(FnNode::new("step1", |_s: &GraphState| async move {
                let mut delta = GraphState::default();
                delta.reasoning.push("step1".into());
                Ok(delta)
            })),
        );
        graph.add_node(
            "step2",
            Arc::new(FnNode::new("step2", |_s: &GraphState| async move {
                let mut delta = GraphState::default();
                delta.reasoning.push("step2".into());
                Ok(delta)
            })),
        );
        graph.add_edge("step1", "step2");
        graph.add_edge("step2", END);
        graph.set_entry_point("step1").unwrap();
        let compiled = graph.compile().unwrap();

        let result = compiled
            .invoke(GraphState::new("t", "tenant", "q", vec![]))
            .await
            .unwrap();

        assert_eq!(result.reasoning, vec!["step1".to_string(), "step2".to_string()]);
    }

    #[tokio::test]
    async fn conditional_edge_routes_to_retry_until_ceiling() {
        // Mirrors the §4.8 retry loop shape: a node that always fails with a
        // retryable error, routed back to itself until a counter trips.
        let mut graph: StateGraph<GraphState> = StateGraph::new();
        graph.add_node(
            "plan",
            Arc::new(FnNode::new("plan", |s: &GraphState| {
                let n = s.reasoning.len();
                async move {
                    let mut delta = GraphState::default();
                    delta.reasoning.push(format!("attempt-{n}"));
                    if n < 2 {
                        delta.errors.push(PipelineError::new(
                            "plan",
                            "retry me",
                            Severity::Error,
                            ErrorCode::PlanningFailure,
                            true,
                        ));
                    }
                    Ok(delta)
                }
            })),
        );
        graph.add_conditional_edge("plan", |s: &GraphState| {
            if s.reasoning.len() < 3 {
                "plan".to_string()
            } else {
                END.to_string()
            }
        });
        graph.set_entry_point("plan").unwrap();
        let compiled = graph.compile().unwrap();

        let result = compiled
            .invoke(GraphState::new("t", "tenant", "q", vec![]))
            .await
            .unwrap();

        assert_eq!(result.reasoning.len(), 3);
    }

    #[tokio::test]
    async fn compile_rejects_missing_entry_point() {
        let graph: StateGraph<GraphState> = StateGraph::new();
        assert!(graph.compile().is_err());
    }
}
