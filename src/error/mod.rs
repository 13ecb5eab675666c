//! Error types for kube-agent.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all kube-agent operations.
#[derive(Error, Debug)]
pub enum KubeAgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("Invalid arguments for tool '{tool_name}': {message}")]
    InvalidArguments { tool_name: String, message: String },

    #[error("Tool execution error: {tool_name} - {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool '{tool_name}' timed out after {timeout_ms}ms")]
    ToolTimeout { tool_name: String, timeout_ms: u64 },

    #[error("Model unavailable after {attempts} attempt(s): {source}")]
    ModelUnavailable {
        attempts: u32,
        #[source]
        source: Box<KubeAgentError>,
    },

    #[error("Step limit of {max_steps} reached before a final answer")]
    StepLimitExceeded { max_steps: usize, summary: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Run canceled")]
    Canceled,
}

impl KubeAgentError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::UnknownTool { .. } | Self::InvalidArguments { .. } => ErrorCategory::ToolCall,
            Self::ToolExecution { .. } | Self::ToolTimeout { .. } => ErrorCategory::ToolExecution,
            Self::ModelUnavailable { .. } => ErrorCategory::ModelUnavailable,
            Self::StepLimitExceeded { .. } => ErrorCategory::StepLimit,
            Self::Canceled => ErrorCategory::Canceled,
            Self::Io(_) | Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Whether the run that produced this error should be reported as failed.
    ///
    /// A step-limit abort is a bounded-effort completion, not a failure.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::StepLimitExceeded { .. })
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolCall | ErrorCategory::ToolExecution => {
                RecoverySuggestion::ReportToModel
            }
            ErrorCategory::ModelUnavailable => match self {
                Self::ModelUnavailable { source, .. } => source.recovery_suggestion(),
                _ => RecoverySuggestion::RetryWithBackoff,
            },
            ErrorCategory::StepLimit => RecoverySuggestion::RaiseStepLimit,
            _ => RecoverySuggestion::None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, KubeAgentError>;
