//! Append-only conversation history.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{KubeAgentError, Result};
use crate::types::{AgentToolCall, AgentToolResult, ModelMessage, Role};

/// Ordered message history of one run.
///
/// Every `tool` message answers a call made by the nearest preceding
/// assistant message, and nothing but `tool` messages sits between that
/// assistant message and its answers. Appends that would break this are
/// rejected; messages are never reordered or removed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Conversation {
    messages: Vec<ModelMessage>,
}

impl Conversation {
    /// Start with a system prompt and the user's instruction.
    pub fn new(system_prompt: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            messages: vec![
                ModelMessage::system(system_prompt),
                ModelMessage::user(instruction),
            ],
        }
    }

    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ModelMessage> {
        self.messages.last()
    }

    /// Append a user message. Rejected while tool calls are unanswered.
    pub fn push_user(&mut self, text: impl Into<String>) -> Result<()> {
        self.ensure_no_pending("user message")?;
        self.messages.push(ModelMessage::user(text));
        Ok(())
    }

    /// Append an assistant text message. Rejected while tool calls are unanswered.
    pub fn push_assistant(&mut self, text: impl Into<String>) -> Result<()> {
        self.ensure_no_pending("assistant message")?;
        self.messages.push(ModelMessage::assistant(text));
        Ok(())
    }

    /// Append an assistant message requesting `calls`.
    pub fn push_tool_calls(
        &mut self,
        text: impl Into<String>,
        calls: Vec<AgentToolCall>,
    ) -> Result<()> {
        self.ensure_no_pending("assistant message")?;
        if calls.is_empty() {
            return Err(KubeAgentError::InvalidState(
                "assistant tool-call message without calls".into(),
            ));
        }
        let mut ids = HashSet::new();
        if let Some(dup) = calls.iter().find(|c| !ids.insert(c.id.as_str())) {
            return Err(KubeAgentError::InvalidState(format!(
                "duplicate tool call id '{}'",
                dup.id
            )));
        }
        self.messages
            .push(ModelMessage::assistant_tool_calls(text, calls));
        Ok(())
    }

    /// Append the answer to a pending tool call.
    pub fn push_tool_result(&mut self, result: AgentToolResult) -> Result<()> {
        let pending = self.pending_tool_calls();
        if !pending.iter().any(|c| c.id == result.tool_call_id) {
            return Err(KubeAgentError::InvalidState(format!(
                "tool result '{}' does not answer a pending tool call",
                result.tool_call_id
            )));
        }
        self.messages.push(ModelMessage::tool_result(result));
        Ok(())
    }

    /// Calls from the latest assistant message that have no result yet.
    pub fn pending_tool_calls(&self) -> Vec<&AgentToolCall> {
        let Some(index) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
        else {
            return Vec::new();
        };
        let answered: HashSet<&str> = self.messages[index + 1..]
            .iter()
            .filter_map(ModelMessage::tool_result_part)
            .map(|r| r.tool_call_id.as_str())
            .collect();
        self.messages[index]
            .tool_calls()
            .into_iter()
            .filter(|c| !answered.contains(c.id.as_str()))
            .collect()
    }

    /// Check the whole history against the ordering rule.
    pub fn validate(&self) -> Result<()> {
        let mut open: Option<HashSet<&str>> = None;
        for (index, message) in self.messages.iter().enumerate() {
            match message.role {
                Role::Tool => {
                    let result = message.tool_result_part().ok_or_else(|| {
                        KubeAgentError::InvalidState(format!(
                            "tool message {index} carries no result"
                        ))
                    })?;
                    let answered = open
                        .as_mut()
                        .map(|ids| ids.remove(result.tool_call_id.as_str()))
                        .unwrap_or(false);
                    if !answered {
                        return Err(KubeAgentError::InvalidState(format!(
                            "tool message {index} does not follow the call '{}'",
                            result.tool_call_id
                        )));
                    }
                }
                Role::Assistant => {
                    if open.as_ref().is_some_and(|ids| !ids.is_empty()) {
                        return Err(KubeAgentError::InvalidState(format!(
                            "message {index} interrupts unanswered tool calls"
                        )));
                    }
                    let ids: HashSet<&str> =
                        message.tool_calls().into_iter().map(|c| c.id.as_str()).collect();
                    open = Some(ids);
                }
                Role::System | Role::User => {
                    if open.as_ref().is_some_and(|ids| !ids.is_empty()) {
                        return Err(KubeAgentError::InvalidState(format!(
                            "message {index} interrupts unanswered tool calls"
                        )));
                    }
                    open = None;
                }
            }
        }
        Ok(())
    }

    fn ensure_no_pending(&self, what: &str) -> Result<()> {
        let pending = self.pending_tool_calls();
        if pending.is_empty() {
            return Ok(());
        }
        Err(KubeAgentError::InvalidState(format!(
            "{what} appended with {} unanswered tool call(s)",
            pending.len()
        )))
    }
}

impl From<Conversation> for Vec<ModelMessage> {
    fn from(conversation: Conversation) -> Self {
        conversation.messages
    }
}
