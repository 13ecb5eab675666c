//! Typed access to tool call arguments.

use crate::error::KubeAgentError;

/// Tool call arguments tagged with the tool they belong to, so extraction
/// errors name it.
#[derive(Debug, Clone)]
pub struct ToolArguments<'a> {
    tool_name: &'a str,
    value: &'a serde_json::Value,
}

impl<'a> ToolArguments<'a> {
    pub fn new(tool_name: &'a str, value: &'a serde_json::Value) -> Self {
        Self { tool_name, value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        self.value
    }

    /// Get a required, non-blank string argument.
    pub fn get_str(&self, key: &str) -> Result<&'a str, KubeAgentError> {
        let value = self
            .get_str_opt(key)
            .ok_or_else(|| self.invalid(format!("missing string argument '{key}'")))?;
        if value.trim().is_empty() {
            return Err(self.invalid(format!("argument '{key}' must not be empty")));
        }
        Ok(value)
    }

    /// Get an optional string argument. Blank strings count as absent.
    pub fn get_str_opt(&self, key: &str) -> Option<&'a str> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Build an `InvalidArguments` error for this tool.
    pub fn invalid(&self, message: impl Into<String>) -> KubeAgentError {
        KubeAgentError::InvalidArguments {
            tool_name: self.tool_name.to_string(),
            message: message.into(),
        }
    }
}
