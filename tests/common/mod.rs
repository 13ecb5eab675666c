//! Shared test helpers: scripted provider and a fake kubectl.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use kube_agent::agent_loop::LoopRunner;
use kube_agent::error::KubeAgentError;
use kube_agent::exec::{CommandExecutor, ExecutorConfig};
use kube_agent::provider::{ModelClient, ModelProvider, ProviderRequest, ProviderResponse};
use kube_agent::types::*;
use kube_agent::util::retry::RetryPolicy;

/// A provider that replays queued responses and records every request.
pub struct ScriptedProvider {
    model_id: String,
    responses: Mutex<Vec<Result<ProviderResponse, KubeAgentError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    /// Returned once the queue is empty; `None` means an API error.
    fallback: Option<ProviderResponse>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            model_id: "gpt-4".to_string(),
            responses: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            fallback: None,
        }
    }

    /// Keep answering with `response` once the queue runs out.
    pub fn repeating(response: ProviderResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new()
        }
    }

    /// Queue a final text answer.
    pub fn queue_final(&self, text: &str) {
        self.responses.lock().unwrap().push(Ok(final_response(text)));
    }

    /// Queue a single tool call.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.responses
            .lock()
            .unwrap()
            .push(Ok(tool_call_response(&[(id, name, args)])));
    }

    /// Queue a turn with several tool calls.
    pub fn queue_tool_calls(&self, calls: &[(&str, &str, serde_json::Value)]) {
        self.responses
            .lock()
            .unwrap()
            .push(Ok(tool_call_response(calls)));
    }

    pub fn queue_error(&self, err: KubeAgentError) {
        self.responses.lock().unwrap().push(Err(err));
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, KubeAgentError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return match &self.fallback {
                Some(response) => Ok(response.clone()),
                None => Err(KubeAgentError::api(503, "script exhausted")),
            };
        }
        responses.remove(0)
    }
}

pub fn final_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        text: text.to_string(),
        usage: Usage {
            input_tokens: 10,
            output_tokens: 20,
            total_tokens: 30,
        },
        tool_calls: vec![],
        finish_reason: Some(FinishReason::Stop),
    }
}

pub fn tool_call_response(calls: &[(&str, &str, serde_json::Value)]) -> ProviderResponse {
    ProviderResponse {
        text: String::new(),
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        },
        tool_calls: calls
            .iter()
            .map(|(id, name, args)| AgentToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args.clone(),
            })
            .collect(),
        finish_reason: Some(FinishReason::ToolCalls),
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
        multiplier: 1.0,
    }
}

/// A runner over `provider` with quick retries and the given executor limits.
pub fn runner(provider: Arc<ScriptedProvider>, executor: ExecutorConfig) -> LoopRunner {
    let client = ModelClient::new(provider).with_retry(fast_retry(3));
    LoopRunner::new(client, CommandExecutor::new(executor))
}

pub fn executor_config(timeout: Duration, max_output_bytes: usize) -> ExecutorConfig {
    ExecutorConfig {
        default_timeout: timeout,
        max_output_bytes,
    }
}

const FAKE_KUBECTL: &str = r#"#!/bin/sh
case "$*" in
  "get pods -n default")
    echo "NAME    READY   STATUS    RESTARTS   AGE"
    echo "web-0   1/1     Running   0          3d"
    echo "web-1   1/1     Running   0          3d"
    ;;
  "get pods -n big")
    i=0
    while [ $i -lt 2000 ]; do
      echo "pod-$i   1/1   Running   0   1d"
      i=$((i+1))
    done
    ;;
  "get pods -n slow")
    sleep 5
    echo "too late"
    ;;
  "get pods -n warn")
    echo "Warning: v1 ComponentStatus is deprecated" >&2
    echo "web-0   1/1   Running"
    ;;
  "apply -f -")
    cat > /dev/null
    echo "deployment.apps/web created"
    ;;
  "-n prod delete pod web-0 --marker "*)
    ( sleep 1; touch "$7" ) | cat
    echo "pod \"web-0\" deleted"
    ;;
  *)
    echo "error: unknown command \"$*\"" >&2
    exit 1
    ;;
esac
"#;

/// Put a fake `kubectl` first on PATH for this test binary.
pub fn install_fake_kubectl() -> PathBuf {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::Builder::new()
            .prefix("kube-agent-bin")
            .tempdir()
            .unwrap()
            .keep();
        let bin = dir.join("kubectl");
        std::fs::write(&bin, FAKE_KUBECTL).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path = std::env::var("PATH").unwrap_or_default();
        std::env::set_var("PATH", format!("{}:{path}", dir.display()));
        dir
    })
    .clone()
}
