//! Retry Handler (spec §4.8 "retry/refinement loop"): backs off and bumps
//! the retry counter before routing back to the AST Planner. The feedback
//! packet itself is composed by the planner's own prompt-builder from
//! `last_error`, which this node deliberately leaves untouched.

use crate::types::SubPipelineState;
use async_trait::async_trait;
use querymesh_core::{Node, Result};
use rand::Rng;
use std::time::Duration;

/// The retry ceiling past which a retryable error still fails the
/// sub-pipeline (spec §4.8 "until retry ceiling").
pub const MAX_RETRIES: usize = 3;

/// `delay = min(10, 1 * 2^retry_count) + U[0, 0.5]` seconds (spec §4.8
/// "backoff").
pub fn backoff_delay(retry_count: usize) -> Duration {
    let exponential = 2f64.powi(retry_count as i32).min(10.0);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..0.5);
    Duration::from_secs_f64(exponential + jitter)
}

/// Sleeps the backoff delay for the current attempt and bumps
/// `retry_count`; routing back to the planner is the graph's job.
pub struct RetryHandler;

#[async_trait]
impl Node<SubPipelineState> for RetryHandler {
    async fn execute(&self, state: &SubPipelineState) -> Result<SubPipelineState> {
        let mut delta = SubPipelineState::default();
        let delay = backoff_delay(state.retry_count);
        tokio::time::sleep(delay).await;
        delta.retry_count = state.retry_count + 1;
        delta.reasoning.push(format!("retrying after a {:.2}s backoff (attempt {})", delay.as_secs_f64(), delta.retry_count));
        Ok(delta)
    }

    fn name(&self) -> &str {
        "retry_handler"
    }
}
