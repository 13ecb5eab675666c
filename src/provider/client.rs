//! Model client: a provider behind a retry policy and a cancellation token.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::error::{KubeAgentError, Result};
use crate::types::{AgentToolCall, FinishReason, GenerationSettings, ModelMessage, Usage};
use crate::util::retry::RetryPolicy;

use super::{create_provider, ModelProvider, ProviderRequest, ToolDefinition};

/// What the model decided to do this turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// A final answer; the run can complete.
    Final { text: String },
    /// One or more tool invocations, with any accompanying reasoning text.
    ToolCalls {
        text: String,
        calls: Vec<AgentToolCall>,
    },
}

impl ModelTurn {
    pub fn text(&self) -> &str {
        match self {
            Self::Final { text } | Self::ToolCalls { text, .. } => text,
        }
    }
}

/// A model turn plus request accounting.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub turn: ModelTurn,
    pub usage: Usage,
    pub finish_reason: Option<FinishReason>,
}

/// Sends conversations to a provider.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn ModelProvider>,
    retry: RetryPolicy,
    settings: GenerationSettings,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
            settings: GenerationSettings::default(),
        }
    }

    /// Build the configured provider with the configured retry budget.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let provider: Arc<dyn ModelProvider> = Arc::from(create_provider(config)?);
        Ok(Self::new(provider).with_retry(
            RetryPolicy::default().with_max_attempts(config.model_max_attempts),
        ))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Ask the model for its next turn.
    ///
    /// `tools: None` disables tool calling for this request. Failures that
    /// survive the retry policy become `ModelUnavailable`; cancellation drops
    /// the in-flight request and returns `Canceled`.
    pub async fn next_turn(
        &self,
        messages: &[ModelMessage],
        tools: Option<Vec<ToolDefinition>>,
        cancel: &CancellationToken,
    ) -> Result<ModelReply> {
        if cancel.is_cancelled() {
            return Err(KubeAgentError::Canceled);
        }

        let request = ProviderRequest {
            messages: messages.to_vec(),
            settings: self.settings.clone(),
            tools,
        };

        debug!(
            provider = self.provider.provider_name(),
            model = self.provider.model_id(),
            "requesting model turn"
        );

        let attempt = self
            .retry
            .execute(|| self.provider.generate_text(&request));
        let result = tokio::select! {
            result = attempt => result,
            _ = cancel.cancelled() => return Err(KubeAgentError::Canceled),
        };

        let response = result.map_err(|failure| {
            warn!(
                attempts = failure.attempts,
                error = %failure.error,
                "model request failed"
            );
            KubeAgentError::ModelUnavailable {
                attempts: failure.attempts,
                source: Box::new(failure.error),
            }
        })?;

        let turn = if response.tool_calls.is_empty() {
            ModelTurn::Final {
                text: response.text,
            }
        } else {
            ModelTurn::ToolCalls {
                text: response.text,
                calls: response.tool_calls,
            }
        };

        Ok(ModelReply {
            turn,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model_id())
            .field("retry", &self.retry)
            .finish()
    }
}
