//! Message types for model communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::KubeAgentError;

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ModelMessage {
    fn with_parts(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_parts(Role::System, vec![ContentPart::Text { text: text.into() }])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_parts(Role::User, vec![ContentPart::Text { text: text.into() }])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_parts(Role::Assistant, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create an assistant message that requests tool calls.
    ///
    /// Empty `text` is dropped so the message carries only the calls.
    pub fn assistant_tool_calls(text: impl Into<String>, calls: Vec<AgentToolCall>) -> Self {
        let text = text.into();
        let mut content = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentPart::Text { text });
        }
        content.extend(calls.into_iter().map(ContentPart::ToolCall));
        Self::with_parts(Role::Assistant, content)
    }

    /// Create a tool result message.
    pub fn tool_result(result: AgentToolResult) -> Self {
        Self::with_parts(Role::Tool, vec![ContentPart::ToolResult(result)])
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract tool calls from this message.
    pub fn tool_calls(&self) -> Vec<&AgentToolCall> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .collect()
    }

    /// The tool result carried by a `tool` message, if any.
    pub fn tool_result_part(&self) -> Option<&AgentToolResult> {
        self.content.iter().find_map(|part| match part {
            ContentPart::ToolResult(result) => Some(result),
            _ => None,
        })
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ToolCall(AgentToolCall),
    ToolResult(AgentToolResult),
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Why a tool call did not produce a successful result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolErrorCategory {
    UnknownTool,
    InvalidArguments,
    Execution,
    Timeout,
    Canceled,
}

/// Outcome of one tool call.
///
/// Standard output and standard error are kept apart so the model can tell
/// success-with-warnings from failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success {
        stdout: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        stderr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default)]
        truncated: bool,
    },
    Failure {
        category: ToolErrorCategory,
        message: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        stdout: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        stderr: String,
        #[serde(default)]
        truncated: bool,
    },
}

impl ToolOutcome {
    /// A failure outcome with no captured output.
    pub fn failure(category: ToolErrorCategory, message: impl Into<String>) -> Self {
        Self::Failure {
            category,
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
        }
    }

    /// Map a tool-level error onto a failure outcome.
    pub fn from_error(err: &KubeAgentError) -> Self {
        let category = match err {
            KubeAgentError::UnknownTool { .. } => ToolErrorCategory::UnknownTool,
            KubeAgentError::InvalidArguments { .. } => ToolErrorCategory::InvalidArguments,
            KubeAgentError::ToolTimeout { .. } => ToolErrorCategory::Timeout,
            KubeAgentError::Canceled => ToolErrorCategory::Canceled,
            _ => ToolErrorCategory::Execution,
        };
        Self::failure(category, err.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn is_truncated(&self) -> bool {
        match self {
            Self::Success { truncated, .. } | Self::Failure { truncated, .. } => *truncated,
        }
    }

    pub fn error_category(&self) -> Option<ToolErrorCategory> {
        match self {
            Self::Failure { category, .. } => Some(*category),
            Self::Success { .. } => None,
        }
    }
}

/// A tool execution result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl AgentToolResult {
    pub fn new(call: &AgentToolCall, outcome: ToolOutcome) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome,
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_error()
    }

    /// JSON text sent back to the model as the tool message content.
    pub fn content_for_model(&self) -> String {
        serde_json::to_string(&self.outcome).unwrap_or_else(|e| {
            format!("{{\"status\":\"failure\",\"category\":\"execution\",\"message\":\"{e}\"}}")
        })
    }
}
