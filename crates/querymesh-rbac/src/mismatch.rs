//! Schema-version mismatch policy (spec §4.7, §9 "Schema-version churn").

use serde::{Deserialize, Serialize};

/// How to treat a retrieved chunk whose `schema_version` does not match the
/// datasource's current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Attach a warning to state but still use the stale candidate.
    Warn,
    /// Surface an error and drop the candidate.
    Fail,
    /// Silently use the candidate as-is.
    Ignore,
}

/// The resolved outcome of applying a [`MismatchPolicy`] to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchOutcome {
    /// Use the candidate; optionally carrying a warning message.
    Use { warning: Option<String> },
    /// Drop the candidate and surface an error message.
    Drop { error: String },
}

/// Applies `policy` to a candidate retrieved at `candidate_version` when the
/// datasource's live version is `current_version`.
pub fn apply(
    policy: MismatchPolicy,
    datasource_id: &str,
    candidate_version: &str,
    current_version: &str,
) -> MismatchOutcome {
    if candidate_version == current_version {
        return MismatchOutcome::Use { warning: None };
    }

    match policy {
        MismatchPolicy::Ignore => MismatchOutcome::Use { warning: None },
        MismatchPolicy::Warn => MismatchOutcome::Use {
            warning: Some(format!(
                "schema version mismatch for '{datasource_id}': candidate is '{candidate_version}', current is '{current_version}'"
            )),
        },
        MismatchPolicy::Fail => MismatchOutcome::Drop {
            error: format!(
                "schema version mismatch for '{datasource_id}': candidate '{candidate_version}' != current '{current_version}'"
            ),
        },
    }
}
