//! Shared orchestrator-level types: the sub-pipeline's reported output
//! shape (spec §4.9 "Fan-out / join semantics") and the datasource registry
//! the orchestrator routes scans through.

use querymesh_adapter::Adapter;
use querymesh_artifacts::ArtifactRef;
use querymesh_core::{Plan, PipelineError};
use querymesh_pipeline::{SubPipelineStatus, SubQuery};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// What one sub-pipeline invocation reports back to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphOutput {
    pub sub_query: SubQuery,
    pub subgraph_id: String,
    pub retry_count: usize,
    pub plan: Option<Plan>,
    pub sql_draft: Option<String>,
    pub artifact: Option<ArtifactRef>,
    pub errors: Vec<PipelineError>,
    pub reasoning: Vec<String>,
    pub status: SubPipelineStatus,
}

/// The set of adapter instances the orchestrator may route scans to,
/// keyed by `datasource_id` (spec §4.1 "one adapter instance per
/// configured datasource").
#[derive(Clone, Default)]
pub struct DatasourceRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl DatasourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(adapter.datasource_id().to_string(), adapter);
    }

    pub fn get(&self, datasource_id: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(datasource_id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Datasource ids whose adapter declares `SUPPORTS_SQL` (spec §4.9 step
    /// 2 "filters out those lacking `SUPPORTS_SQL`").
    pub fn sql_capable_ids(&self) -> Vec<String> {
        self.adapters
            .iter()
            .filter(|(_, a)| a.capabilities().contains(&querymesh_adapter::Capability::SupportsSql))
            .map(|(id, _)| id.clone())
            .collect()
    }
}
