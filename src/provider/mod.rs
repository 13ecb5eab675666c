//! Model provider trait and implementations.

pub mod client;
pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "azure")]
pub mod azure;

pub use client::{ModelClient, ModelTurn};

use async_trait::async_trait;

use crate::config::{AgentConfig, Credentials};
use crate::error::KubeAgentError;
use crate::types::{AgentToolCall, FinishReason, GenerationSettings, ModelMessage, Usage};

/// A request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub messages: Vec<ModelMessage>,
    pub settings: GenerationSettings,
    pub tools: Option<Vec<ToolDefinition>>,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Response from a provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: Usage,
    pub tool_calls: Vec<AgentToolCall>,
    pub finish_reason: Option<FinishReason>,
}

/// Core trait implemented by all model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "azure").
    fn provider_name(&self) -> &str;
    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Generate a chat completion (non-streaming).
    async fn generate_text(&self, request: &ProviderRequest)
        -> Result<ProviderResponse, KubeAgentError>;
}

/// Create the provider selected by the configured credentials.
pub fn create_provider(config: &AgentConfig) -> Result<Box<dyn ModelProvider>, KubeAgentError> {
    match &config.credentials {
        #[cfg(feature = "openai")]
        Credentials::OpenAi { api_key, base_url } => Ok(Box::new(
            openai::OpenAiProvider::new(config.model.clone(), api_key, base_url.clone())
                .with_timeout(config.request_timeout),
        )),
        #[cfg(feature = "azure")]
        Credentials::Azure {
            api_key,
            endpoint,
            api_version,
        } => Ok(Box::new(
            azure::AzureOpenAiProvider::new(endpoint, &config.model, api_key, api_version)
                .with_timeout(config.request_timeout),
        )),
        #[allow(unreachable_patterns)]
        other => Err(KubeAgentError::Configuration(format!(
            "Provider '{}' not enabled. Enable the '{}' feature.",
            other.provider_name(),
            other.provider_name()
        ))),
    }
}
