//! Top-Level DAG Orchestrator (C9): intent validation, datasource
//! resolution, decomposition, global planning, parallel scan fan-out,
//! engine aggregation, and answer synthesis (spec §4.9).

pub mod answer_synthesizer;
pub mod dag;
pub mod datasource_resolver;
pub mod decomposer;
pub mod engine_aggregator;
pub mod global_planner;
pub mod intent_validator;
pub mod layer_router;
pub mod orchestrator;
pub mod types;

pub use answer_synthesizer::AnswerSynthesizer;
pub use dag::{DagError, ExecutionDag};
pub use datasource_resolver::{DatasourceResolver, ResolvedDatasource};
pub use decomposer::Decomposer;
pub use engine_aggregator::{AggregatorError, EngineAggregator, Relation};
pub use global_planner::GlobalPlanner;
pub use intent_validator::IntentValidator;
pub use layer_router::LayerRouter;
pub use orchestrator::Orchestrator;
pub use types::{DatasourceRegistry, SubgraphOutput};
