//! Engine Aggregator (spec §4.9 step 6): walks the DAG beyond the scan
//! layer, reading input frames from the artifact store and applying the
//! declared combine/post-combine operators in a deterministic, in-memory
//! engine. Produces `terminal_results[terminal_node_id] -> rows[]` and,
//! for any node whose output is itself worth persisting, a `computed_ref`.
//!
//! A node's operator arguments beyond `kind`/`inputs`/`output_schema` are
//! read from its `params` JSON value (see
//! [`querymesh_agents::DagNode`]'s doc comment): a combine's `op` (`union`
//! defaults when every input's schema matches exactly, `join` otherwise,
//! on the columns common to every input unless `params.on` says
//! otherwise), a filter's `column`/`comparator`/`value`, a group-agg's
//! `group_by`/`aggregates`, an order-limit's `order_by`/`limit`.

use crate::dag::ExecutionDag;
use querymesh_agents::DagNodeKind;
use querymesh_artifacts::ArtifactStore;
use querymesh_core::{ColumnSpec, ResultFrame};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// One in-memory relation the engine operates on between steps.
#[derive(Debug, Clone)]
pub struct Relation {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl Relation {
    fn from_frame(frame: &ResultFrame) -> Self {
        Self { columns: frame.columns.iter().map(|c| c.name.clone()).collect(), rows: frame.rows.clone() }
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn project(&self, columns: &[String]) -> Relation {
        let indices: Vec<Option<usize>> = columns.iter().map(|c| self.column_index(c)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|idx| idx.and_then(|i| row.get(i).cloned()).unwrap_or(serde_json::Value::Null)).collect())
            .collect();
        Relation { columns: columns.to_vec(), rows }
    }

    fn to_frame(&self) -> ResultFrame {
        ResultFrame::success(self.columns.iter().map(|c| ColumnSpec { name: c.clone(), data_type: "text".to_string() }).collect(), self.rows.clone())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("node '{0}' has no materialized relation to read from")]
    MissingInput(String),
    #[error("node '{0}' declares an unsupported comparator '{1}'")]
    UnsupportedComparator(String, String),
    #[error("node '{0}' declares an unsupported aggregate function '{1}'")]
    UnsupportedAggregate(String, String),
}

#[derive(Deserialize, Default)]
struct CombineParams {
    op: Option<String>,
    #[serde(default)]
    on: Vec<String>,
}

#[derive(Deserialize)]
struct FilterParams {
    column: String,
    comparator: String,
    value: serde_json::Value,
}

#[derive(Deserialize, Default)]
struct GroupAggParams {
    #[serde(default)]
    group_by: Vec<String>,
    #[serde(default)]
    aggregates: Vec<AggregateSpec>,
}

#[derive(Deserialize, Clone)]
struct AggregateSpec {
    func: String,
    column: String,
    alias: String,
}

#[derive(Deserialize, Default)]
struct OrderLimitParams {
    #[serde(default)]
    order_by: Vec<OrderKey>,
    limit: Option<usize>,
}

#[derive(Deserialize, Clone)]
struct OrderKey {
    column: String,
    #[serde(default)]
    descending: bool,
}

/// Walks `dag`'s non-scan layers, materializing each node's [`Relation`]
/// from its inputs.
pub struct EngineAggregator {
    artifacts: std::sync::Arc<ArtifactStore>,
}

impl EngineAggregator {
    pub fn new(artifacts: std::sync::Arc<ArtifactStore>) -> Self {
        Self { artifacts }
    }

    /// Runs every layer after the scan layer, given each scan node's
    /// already-materialized frame (read from its `ArtifactRef`).
    pub async fn run(
        &self,
        dag: &ExecutionDag,
        scan_frames: &HashMap<String, ResultFrame>,
    ) -> Result<HashMap<String, Relation>, AggregatorError> {
        let mut materialized: HashMap<String, Relation> = scan_frames.iter().map(|(id, frame)| (id.clone(), Relation::from_frame(frame))).collect();

        for layer in dag.layers().iter().skip(1) {
            for node_id in layer {
                let node = dag.node(node_id).expect("layer membership implies presence in the dag");
                let inputs: Vec<&Relation> = node
                    .inputs
                    .iter()
                    .map(|input| materialized.get(&input.id).ok_or_else(|| AggregatorError::MissingInput(input.id.clone())))
                    .collect::<Result<_, _>>()?;

                let relation = match node.kind {
                    DagNodeKind::Scan => unreachable!("scans never appear outside the first layer"),
                    DagNodeKind::Combine => Self::combine(node_id, &inputs, &node.params)?,
                    DagNodeKind::PostFilter => Self::filter(node_id, inputs[0], &node.params)?,
                    DagNodeKind::Project => inputs[0].project(&node.output_schema),
                    DagNodeKind::GroupAgg => Self::group_agg(inputs[0], &node.params),
                    DagNodeKind::OrderLimit => Self::order_limit(inputs[0], &node.params),
                };
                materialized.insert(node_id.clone(), relation);
            }
        }

        Ok(materialized)
    }

    /// Persists a computed (non-scan) relation back to the artifact store,
    /// for a terminal node worth keeping as its own ref.
    pub async fn persist(&self, relation: &Relation, meta: querymesh_artifacts::WriteMetadata) -> Result<querymesh_artifacts::ArtifactRef, querymesh_artifacts::ArtifactError> {
        self.artifacts.write_result_frame(&relation.to_frame(), meta).await
    }

    fn combine(_node_id: &str, inputs: &[&Relation], params: &serde_json::Value) -> Result<Relation, AggregatorError> {
        let parsed: CombineParams = serde_json::from_value(params.clone()).unwrap_or_default();
        let schemas_match = inputs.windows(2).all(|pair| pair[0].columns == pair[1].columns);
        let op = parsed.op.as_deref().unwrap_or(if schemas_match { "union" } else { "join" });

        if op == "union" {
            let columns = inputs[0].columns.clone();
            let rows = inputs.iter().flat_map(|r| r.rows.clone()).collect();
            return Ok(Relation { columns, rows });
        }

        let join_keys = if parsed.on.is_empty() { common_columns(inputs) } else { parsed.on };
        Ok(inputs.iter().skip(1).fold(inputs[0].clone(), |left, right| inner_join(&left, right, &join_keys)))
    }

    fn filter(node_id: &str, input: &Relation, params: &serde_json::Value) -> Result<Relation, AggregatorError> {
        let Ok(parsed) = serde_json::from_value::<FilterParams>(params.clone()) else {
            return Ok(input.clone());
        };
        if !matches!(parsed.comparator.as_str(), "eq" | "neq" | "gt" | "gte" | "lt" | "lte") {
            return Err(AggregatorError::UnsupportedComparator(node_id.to_string(), parsed.comparator));
        }
        let Some(idx) = input.column_index(&parsed.column) else {
            return Ok(input.clone());
        };
        let rows = input
            .rows
            .iter()
            .filter(|row| compare(&row[idx], &parsed.comparator, &parsed.value).unwrap_or(false))
            .cloned()
            .collect::<Vec<_>>();
        Ok(Relation { columns: input.columns.clone(), rows })
    }

    fn group_agg(input: &Relation, params: &serde_json::Value) -> Relation {
        let parsed: GroupAggParams = serde_json::from_value(params.clone()).unwrap_or_default();
        let group_indices: Vec<usize> = parsed.group_by.iter().filter_map(|c| input.column_index(c)).collect();

        let mut groups: Vec<(Vec<serde_json::Value>, Vec<&Vec<serde_json::Value>>)> = Vec::new();
        for row in &input.rows {
            let key: Vec<serde_json::Value> = group_indices.iter().map(|&i| row[i].clone()).collect();
            match groups.iter_mut().find(|(k, _)| k == &key) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((key, vec![row])),
            }
        }

        let mut columns = parsed.group_by.clone();
        columns.extend(parsed.aggregates.iter().map(|a| a.alias.clone()));

        let rows = groups
            .into_iter()
            .map(|(key, rows)| {
                let mut out = key;
                for agg in &parsed.aggregates {
                    out.push(apply_aggregate(input, &rows, agg));
                }
                out
            })
            .collect();

        Relation { columns, rows }
    }

    fn order_limit(input: &Relation, params: &serde_json::Value) -> Relation {
        let parsed: OrderLimitParams = serde_json::from_value(params.clone()).unwrap_or_default();
        let mut rows = input.rows.clone();
        let keys: Vec<(usize, bool)> = parsed.order_by.iter().filter_map(|k| input.column_index(&k.column).map(|i| (i, k.descending))).collect();

        rows.sort_by(|a, b| {
            for &(idx, descending) in &keys {
                let ordering = compare_values(&a[idx], &b[idx]);
                let ordering = if descending { ordering.reverse() } else { ordering };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });

        if let Some(limit) = parsed.limit {
            rows.truncate(limit);
        }
        Relation { columns: input.columns.clone(), rows }
    }
}

fn common_columns(inputs: &[&Relation]) -> Vec<String> {
    let mut common = inputs[0].columns.clone();
    for relation in &inputs[1..] {
        common.retain(|c| relation.columns.contains(c));
    }
    common
}

fn inner_join(left: &Relation, right: &Relation, keys: &[String]) -> Relation {
    let left_indices: Vec<usize> = keys.iter().filter_map(|k| left.column_index(k)).collect();
    let right_indices: Vec<usize> = keys.iter().filter_map(|k| right.column_index(k)).collect();

    let mut columns = left.columns.clone();
    for (i, c) in right.columns.iter().enumerate() {
        if !keys.contains(c) || !right_indices.contains(&i) {
            columns.push(c.clone());
        }
    }

    let mut rows = Vec::new();
    for left_row in &left.rows {
        let left_key: Vec<&serde_json::Value> = left_indices.iter().map(|&i| &left_row[i]).collect();
        for right_row in &right.rows {
            let right_key: Vec<&serde_json::Value> = right_indices.iter().map(|&i| &right_row[i]).collect();
            if left_key == right_key {
                let mut row = left_row.clone();
                for (i, value) in right_row.iter().enumerate() {
                    if !right_indices.contains(&i) {
                        row.push(value.clone());
                    }
                }
                rows.push(row);
            }
        }
    }
    Relation { columns, rows }
}

fn compare(value: &serde_json::Value, comparator: &str, target: &serde_json::Value) -> Option<bool> {
    Some(match comparator {
        "eq" => value == target,
        "neq" => value != target,
        "gt" => compare_values(value, target) == std::cmp::Ordering::Greater,
        "gte" => compare_values(value, target) != std::cmp::Ordering::Less,
        "lt" => compare_values(value, target) == std::cmp::Ordering::Less,
        "lte" => compare_values(value, target) != std::cmp::Ordering::Greater,
        _ => return None,
    })
}

fn compare_values(a: &serde_json::Value, b: &serde_json::Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn apply_aggregate(input: &Relation, rows: &[&Vec<serde_json::Value>], agg: &AggregateSpec) -> serde_json::Value {
    if agg.func == "count" {
        return serde_json::json!(rows.len() as u64);
    }
    let Some(idx) = input.column_index(&agg.column) else {
        return serde_json::Value::Null;
    };
    let values: Vec<f64> = rows.iter().filter_map(|r| r[idx].as_f64()).collect();
    match agg.func.as_str() {
        "sum" => serde_json::json!(values.iter().sum::<f64>()),
        "avg" => serde_json::json!(if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 }),
        "min" => serde_json::json!(values.iter().cloned().fold(f64::INFINITY, f64::min)),
        "max" => serde_json::json!(values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
        _ => serde_json::Value::Null,
    }
}
