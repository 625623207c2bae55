//! Testing utilities for QueryMesh: [`MockAdapter`] and [`MockAgentClient`],
//! configurable doubles for the two external-boundary traits
//! (`querymesh_adapter::Adapter` and `querymesh_agents::LlmClient`) so the
//! rest of the workspace can test pipeline and orchestrator behavior
//! without a live datasource or LLM vendor call.
//!
//! Grounded on `dashflow-testing`: a dedicated crate holding mock
//! implementations of the domain's external collaborator traits, each with
//! a builder, call history, and a fail-next switch.

mod mock_adapter;
mod mock_llm_client;

pub use mock_adapter::MockAdapter;
pub use mock_llm_client::MockAgentClient;

/// Re-exports the mocks under one import, mirroring the teacher's
/// `dashflow_testing::prelude`.
pub mod prelude {
    pub use crate::{MockAdapter, MockAgentClient};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_reexports_both_mocks() {
        let _adapter = MockAdapter::new("ds");
        let _client = MockAgentClient::new();
    }
}
