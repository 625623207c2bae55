//! Errors the agent boundary can raise (spec §4.12, §7).

use thiserror::Error;

/// Failures from calling or parsing an LLM-backed agent. Callers convert
/// these into a `querymesh_core::PipelineError` with the appropriate
/// error code (`MISSING_LLM`, `PLANNING_FAILURE`, `AGGREGATOR_FAILED`, …)
/// for the specific node that raised them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    /// The underlying model call failed (network, auth, rate limit, …).
    #[error("LLM call failed: {0}")]
    CallFailed(String),
    /// The model returned no usable content.
    #[error("LLM returned an empty response")]
    EmptyResponse,
    /// The response could not be parsed into the agent's contract type.
    #[error("agent '{agent}' failed to parse structured output: {message}")]
    ParseFailure { agent: String, message: String },
}
