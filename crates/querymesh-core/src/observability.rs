//! Structured logs, latency histograms, and token counters (spec §4.11).

use prometheus::{HistogramVec, IntCounterVec, Opts, Registry};
use std::time::Instant;

/// Process-wide metrics registry. Constructed once and shared; never
/// reconstructed per request (spec §9 "Global state").
pub struct Metrics {
    /// Per-node execution duration, keyed by `(node, datasource_id)`.
    pub node_duration_seconds: HistogramVec,
    /// LLM token usage, keyed by `(agent, model, datasource_id, kind)` where
    /// `kind in {prompt, completion, total}`.
    pub llm_tokens_total: IntCounterVec,
    registry: Registry,
}

impl Metrics {
    /// Builds a fresh registry with both metric families registered.
    pub fn new() -> Self {
        let registry = Registry::new();

        let node_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "querymesh_node_duration_seconds",
                "Duration of a single graph node execution, in seconds",
            ),
            &["node", "datasource_id"],
        )
        .expect("valid histogram metric");

        let llm_tokens_total = IntCounterVec::new(
            Opts::new("querymesh_llm_tokens_total", "LLM token usage"),
            &["agent", "model", "datasource_id", "kind"],
        )
        .expect("valid counter metric");

        registry
            .register(Box::new(node_duration_seconds.clone()))
            .expect("register node_duration_seconds");
        registry
            .register(Box::new(llm_tokens_total.clone()))
            .expect("register llm_tokens_total");

        Self {
            node_duration_seconds,
            llm_tokens_total,
            registry,
        }
    }

    /// The underlying `prometheus::Registry`, for an (out-of-scope) exporter
    /// to gather from.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Records a node's wall-clock duration. `datasource_id` is `""` when
    /// the node is not datasource-scoped (e.g. the Decomposer).
    pub fn observe_node_duration(&self, node: &str, datasource_id: &str, duration: std::time::Duration) {
        self.node_duration_seconds
            .with_label_values(&[node, datasource_id])
            .observe(duration.as_secs_f64());
    }

    /// Records LLM token usage for one agent call.
    pub fn record_llm_tokens(
        &self,
        agent: &str,
        model: &str,
        datasource_id: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) {
        self.llm_tokens_total
            .with_label_values(&[agent, model, datasource_id, "prompt"])
            .inc_by(prompt_tokens);
        self.llm_tokens_total
            .with_label_values(&[agent, model, datasource_id, "completion"])
            .inc_by(completion_tokens);
        self.llm_tokens_total
            .with_label_values(&[agent, model, datasource_id, "total"])
            .inc_by(prompt_tokens + completion_tokens);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII stopwatch that records an observation into a [`Metrics`] histogram
/// on drop, so a node can `let _t = timer(&metrics, "planner", "ds1");` at
/// the top of its `execute` and forget about it.
pub struct NodeTimer<'a> {
    metrics: &'a Metrics,
    node: String,
    datasource_id: String,
    started_at: Instant,
}

impl<'a> NodeTimer<'a> {
    /// Starts timing `node` (optionally scoped to `datasource_id`).
    pub fn start(metrics: &'a Metrics, node: impl Into<String>, datasource_id: impl Into<String>) -> Self {
        Self {
            metrics,
            node: node.into(),
            datasource_id: datasource_id.into(),
            started_at: Instant::now(),
        }
    }
}

impl Drop for NodeTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .observe_node_duration(&self.node, &self.datasource_id, self.started_at.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_node_duration_and_token_usage() {
        let metrics = Metrics::new();
        {
            let _t = NodeTimer::start(&metrics, "planner", "ds1");
        }
        metrics.record_llm_tokens("planner", "gpt-4o", "ds1", 100, 50);

        let families = metrics.registry().gather();
        let names: Vec<_> = families.iter().map(|f| f.name()).collect();
        assert!(names.contains(&"querymesh_node_duration_seconds"));
        assert!(names.contains(&"querymesh_llm_tokens_total"));
    }
}
