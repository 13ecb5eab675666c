//! Run state machine.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::{KubeAgentError, Result};

/// Lifecycle of a single agent run.
///
/// `Initialized -> Thinking -> (Acting -> Thinking)* -> Completed`, with
/// `Acting -> Aborted` when the step limit is hit and any non-terminal state
/// able to move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Initialized,
    Thinking,
    Acting,
    Completed,
    Aborted,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Initialized, Thinking)
            | (Thinking, Acting)
            | (Acting, Thinking)
            | (Thinking, Completed)
            | (Acting, Aborted) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(KubeAgentError::InvalidState(format!(
                "cannot move run from {self} to {next}"
            )));
        }
        *self = next;
        Ok(())
    }
}
