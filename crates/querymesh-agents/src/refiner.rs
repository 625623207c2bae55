//! Builds the textual feedback packet the Refiner hands back to the AST
//! Planner on a retryable failure (spec §4.8 "retry/refinement loop").
//! This is deterministic glue, not an LLM contract — it composes the
//! accumulated errors and the last plan into a prompt fragment.

use querymesh_core::{PipelineError, Plan};

/// Renders the accumulated `errors` and the last rejected `plan` into a
/// single feedback string prepended to the planner's next prompt.
pub fn build_feedback_packet(errors: &[PipelineError], plan: Option<&Plan>) -> String {
    let mut packet = String::from("Your previous plan was rejected. Fix the following issues:\n");
    for error in errors {
        packet.push_str(&format!("- [{:?}] {}\n", error.error_code, error.safe_message));
    }
    if let Some(plan) = plan {
        packet.push_str("\nPrevious plan (for reference, do not repeat its mistakes):\n");
        packet.push_str(&serde_json::to_string(plan).unwrap_or_default());
    }
    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use querymesh_core::{ErrorCode, Severity};

    #[test]
    fn includes_every_accumulated_error() {
        let errors = vec![
            PipelineError::new("logical_validator", "unknown column 'foo'", Severity::Error, ErrorCode::PlanningFailure, true),
            PipelineError::new("logical_validator", "join alias undeclared", Severity::Error, ErrorCode::PlanningFailure, true),
        ];
        let packet = build_feedback_packet(&errors, None);
        assert!(packet.contains("unknown column 'foo'"));
        assert!(packet.contains("join alias undeclared"));
    }

    #[test]
    fn omits_previous_plan_section_when_none() {
        let packet = build_feedback_packet(&[], None);
        assert!(!packet.contains("Previous plan"));
    }
}
