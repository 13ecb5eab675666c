//! Core run types for the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::error::{KubeAgentError, Result};
use crate::types::Usage;

use super::conversation::Conversation;

/// Unique run identifier.
pub type RunId = Uuid;

/// How a run that did not fail ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    /// The model produced a final answer.
    Completed,
    /// The step limit was reached; the text is a partial summary.
    Aborted,
}

/// Result of a run that reached `Completed` or `Aborted`.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Final answer, or the partial summary for an aborted run.
    pub text: String,
    pub steps: usize,
    pub max_steps: usize,
    pub tool_executions: usize,
    pub usage: Usage,
    pub conversation: Conversation,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// The final answer, or `StepLimitExceeded` carrying the partial summary.
    pub fn into_answer(self) -> Result<String> {
        match self.status {
            RunStatus::Completed => Ok(self.text),
            RunStatus::Aborted => Err(KubeAgentError::StepLimitExceeded {
                max_steps: self.max_steps,
                summary: self.text,
            }),
        }
    }
}

/// Remove a trailing `TERMINATE` completion marker.
///
/// Trailing periods and asterisks around the marker are ignored, so
/// `"All pods healthy. **TERMINATE**."` becomes `"All pods healthy."`.
pub fn strip_terminate_marker(text: &str) -> String {
    const MARKER: &str = "TERMINATE";
    let trimmed = text.trim().trim_end_matches(['.', '*']).trim_end();
    let split = trimmed.len().saturating_sub(MARKER.len());
    match trimmed.get(split..) {
        Some(tail) if tail.eq_ignore_ascii_case(MARKER) => trimmed[..split]
            .trim_end()
            .trim_end_matches('*')
            .trim_end()
            .to_string(),
        _ => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_marker() {
        assert_eq!(strip_terminate_marker("All pods healthy.\nTERMINATE"), "All pods healthy.");
        assert_eq!(strip_terminate_marker("Done. **TERMINATE**."), "Done.");
        assert_eq!(strip_terminate_marker("done terminate"), "done");
        assert_eq!(strip_terminate_marker("TERMINATE"), "");
    }

    #[test]
    fn leaves_other_text_alone() {
        assert_eq!(strip_terminate_marker("  3 pods running  "), "3 pods running");
        assert_eq!(
            strip_terminate_marker("Do not TERMINATE the pod yet"),
            "Do not TERMINATE the pod yet"
        );
        assert_eq!(strip_terminate_marker("é"), "é");
    }

    #[test]
    fn aborted_outcome_becomes_step_limit_error() {
        let outcome = RunOutcome {
            run_id: Uuid::new_v4(),
            status: RunStatus::Aborted,
            text: "checked 2 pods".into(),
            steps: 2,
            max_steps: 2,
            tool_executions: 2,
            usage: Usage::default(),
            conversation: Conversation::new("sys", "go"),
            finished_at: Utc::now(),
        };
        match outcome.into_answer().unwrap_err() {
            KubeAgentError::StepLimitExceeded { max_steps, summary } => {
                assert_eq!(max_steps, 2);
                assert_eq!(summary, "checked 2 pods");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
