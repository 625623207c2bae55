//! Validates a drafted execution DAG and computes its layered topological
//! order (spec §3 "Execution DAG", §4.9 step 4 "the orchestrator precomputes
//! the layered topological order" — the model is not trusted to emit one).

use querymesh_agents::{DagNode, DagNodeKind, ExecutionDagDraft, InputSource};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Why a drafted DAG was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DagError {
    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),
    #[error("node '{0}' declares no output schema")]
    EmptyOutputSchema(String),
    #[error("scan node '{0}' declares inputs, but scans are the DAG's leaves")]
    ScanWithInputs(String),
    #[error("non-scan node '{0}' declares no inputs")]
    NonScanWithoutInputs(String),
    #[error("node '{node}' references unknown input id '{input}'")]
    UnknownInput { node: String, input: String },
    #[error("node '{node}' input '{input}' tags source as {expected} but the referenced node's kind disagrees")]
    InputSourceMismatch { node: String, input: String, expected: &'static str },
    #[error("DAG contains a cycle (or a node is unreachable from the scan leaves)")]
    Cycle,
}

/// A validated execution DAG with its precomputed layering: layer 0 is
/// every scan node; subsequent layers are combine/post-combine steps in
/// dependency order.
#[derive(Debug, Clone)]
pub struct ExecutionDag {
    nodes: HashMap<String, DagNode>,
    layers: Vec<Vec<String>>,
}

impl ExecutionDag {
    /// Validates `draft` and computes its layering.
    pub fn build(draft: ExecutionDagDraft) -> Result<Self, DagError> {
        let mut nodes = HashMap::new();
        for node in draft.nodes {
            if nodes.insert(node.id.clone(), node.clone()).is_some() {
                return Err(DagError::DuplicateNodeId(node.id));
            }
        }

        for node in nodes.values() {
            if node.output_schema.is_empty() {
                return Err(DagError::EmptyOutputSchema(node.id.clone()));
            }
            match node.kind {
                DagNodeKind::Scan if !node.inputs.is_empty() => return Err(DagError::ScanWithInputs(node.id.clone())),
                DagNodeKind::Scan => {}
                _ if node.inputs.is_empty() => return Err(DagError::NonScanWithoutInputs(node.id.clone())),
                _ => {}
            }
            for input in &node.inputs {
                let Some(referenced) = nodes.get(&input.id) else {
                    return Err(DagError::UnknownInput { node: node.id.clone(), input: input.id.clone() });
                };
                let kind_matches = match input.source {
                    InputSource::Scan => referenced.kind == DagNodeKind::Scan,
                    InputSource::Step => referenced.kind != DagNodeKind::Scan,
                };
                if !kind_matches {
                    let expected = match input.source {
                        InputSource::Scan => "scan",
                        InputSource::Step => "step",
                    };
                    return Err(DagError::InputSourceMismatch { node: node.id.clone(), input: input.id.clone(), expected });
                }
            }
        }

        let layers = Self::layer(&nodes)?;
        Ok(Self { nodes, layers })
    }

    fn layer(nodes: &HashMap<String, DagNode>) -> Result<Vec<Vec<String>>, DagError> {
        let mut indegree: HashMap<String, usize> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for node in nodes.values() {
            indegree.insert(node.id.clone(), node.inputs.len());
            for input in &node.inputs {
                dependents.entry(input.id.clone()).or_default().push(node.id.clone());
            }
        }

        let mut layers = Vec::new();
        let mut frontier: Vec<String> = indegree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| id.clone()).collect();
        frontier.sort();
        let mut remaining: HashSet<String> = nodes.keys().cloned().collect();

        while !frontier.is_empty() {
            for id in &frontier {
                remaining.remove(id);
            }
            let mut next = Vec::new();
            for id in &frontier {
                if let Some(deps) = dependents.get(id) {
                    for dependent in deps {
                        let entry = indegree.get_mut(dependent).expect("dependent tracked in indegree");
                        *entry -= 1;
                        if *entry == 0 {
                            next.push(dependent.clone());
                        }
                    }
                }
            }
            layers.push(std::mem::take(&mut frontier));
            next.sort();
            next.dedup();
            frontier = next;
        }

        if !remaining.is_empty() {
            return Err(DagError::Cycle);
        }
        Ok(layers)
    }

    pub fn node(&self, id: &str) -> Option<&DagNode> {
        self.nodes.get(id)
    }

    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    /// The first layer (always the scan leaves).
    pub fn scan_ids(&self) -> &[String] {
        self.layers.first().map(Vec::as_slice).unwrap_or(&[])
    }
}
