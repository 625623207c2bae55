//! The `Node` trait executed by [`crate::graph::StateGraph`] (spec §9:
//! "per-node nodes return delta dictionaries").
//!
//! Grounded on `dashflow`'s `Node<S>` trait (`crates/dashflow/src/api.rs`,
//! e.g. `GenerateNode`): an async `execute` taking owned state and
//! returning the (possibly unchanged) state, plus a `name()` for logging
//! and progress tracking.

use crate::error::Result;
use crate::state::MergeableState;
use async_trait::async_trait;
use std::fmt;

/// A single unit of work in a [`crate::graph::StateGraph`].
///
/// `execute` receives the state accumulated so far and returns a **delta**:
/// a state value holding only the fields this node set. The graph engine
/// merges the delta into the running state via [`MergeableState::merge`]
/// after the node returns, never before — so a node never observes another
/// concurrently-running node's delta mid-execution (spec §5: "Sub-queries
/// within a layer have NO inter-ordering").
#[async_trait]
pub trait Node<S: MergeableState>: Send + Sync {
    /// Runs this node, producing a state delta.
    async fn execute(&self, state: &S) -> Result<S>;

    /// Stable node name, used for routing, logging, and metrics labels.
    fn name(&self) -> &str;
}

impl<S: MergeableState> fmt::Debug for dyn Node<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.name())
    }
}

/// A closure-backed [`Node`], for lightweight/inline node definitions in
/// tests and small glue steps — mirrors `dashflow::StateGraph::add_node`'s
/// closure overload.
///
/// The wrapped closure receives the accumulated state *by reference*, for
/// reading only, and must return a fresh delta (typically built from
/// `S::default()`) holding just the fields it sets. It must never clone
/// the accumulated state and hand the clone back as the delta: the graph
/// engine appends/unions delta lists and maps onto the running state's, so
/// a delta that already contains the accumulated history would be folded
/// in a second time.
pub struct FnNode<S, F> {
    name: String,
    func: F,
    _marker: std::marker::PhantomData<S>,
}

impl<S, F> FnNode<S, F> {
    /// Wraps `func` as a named node.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<S, F, Fut> Node<S> for FnNode<S, F>
where
    S: MergeableState,
    F: Fn(&S) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<S>> + Send,
{
    async fn execute(&self, state: &S) -> Result<S> {
        (self.func)(state).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
