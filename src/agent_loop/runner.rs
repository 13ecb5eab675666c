//! Runner interfaces for the agent loop.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AgentConfig, DEFAULT_MAX_STEPS};
use crate::error::{KubeAgentError, Result};
use crate::exec::{CommandExecutor, ExecutorConfig};
use crate::provider::{ModelClient, ModelTurn, ToolDefinition};
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{AgentToolCall, AgentToolResult, Role, ToolOutcome, Usage};
use crate::util::truncate::truncate_utf8;

use super::conversation::Conversation;
use super::events::{RunEventEmitter, RunEventPayload, RunEventSink, RunLifecycle};
use super::prompts;
use super::state::RunState;
use super::types::{strip_terminate_marker, RunId, RunOutcome, RunStatus};

const WRAP_UP_PROMPT: &str = "\
The step limit for this task has been reached and no more tools can be run. \
Summarize what you found so far, what remains unresolved, and the next \
commands you would run.";

const SUMMARY_EXCERPT_BYTES: usize = 500;

/// Request payload to start a run.
#[derive(Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    pub instruction: String,
    pub max_steps: usize,
    pub registry: Arc<ToolRegistry>,
    pub event_sink: Option<RunEventSink>,
    pub cancel: CancellationToken,
}

impl RunRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            instruction: instruction.into(),
            max_steps: DEFAULT_MAX_STEPS,
            registry: Arc::new(ToolRegistry::default()),
            event_sink: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_event_sink(mut self, sink: RunEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Tie the run to an external token, e.g. one cancelled on Ctrl-C.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl std::fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRequest")
            .field("run_id", &self.run_id)
            .field("instruction", &self.instruction)
            .field("max_steps", &self.max_steps)
            .field("tools", &self.registry.names())
            .finish()
    }
}

/// Handle for an in-flight run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    cancel: CancellationToken,
    task: JoinHandle<Result<RunOutcome>>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Request cancellation. The in-flight model request is dropped and any
    /// running tool process is killed.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end.
    ///
    /// `Ok` for completed and step-limited runs, `Err` for failed ones.
    pub async fn wait(self) -> Result<RunOutcome> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(KubeAgentError::Canceled),
            Err(err) => Err(KubeAgentError::InvalidState(format!("run task panicked: {err}"))),
        }
    }
}

/// Runner trait for executing agent loop requests.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn start(&self, request: RunRequest) -> Result<RunHandle>;
}

/// Default agent-loop runner: model turns, tool execution, event stream.
#[derive(Debug, Clone)]
pub struct LoopRunner {
    client: ModelClient,
    executor: CommandExecutor,
}

impl LoopRunner {
    pub fn new(client: ModelClient, executor: CommandExecutor) -> Self {
        Self { client, executor }
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        Ok(Self::new(
            ModelClient::from_config(config)?,
            CommandExecutor::new(ExecutorConfig::from(config)),
        ))
    }

    pub fn client(&self) -> &ModelClient {
        &self.client
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Drive a run to completion on the current task.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        if request.max_steps == 0 {
            return Err(KubeAgentError::Configuration(
                "max_steps must be at least 1".into(),
            ));
        }
        let emitter = RunEventEmitter::new(request.run_id, request.event_sink.clone());
        let mut run = AgentRun::new(request, self.client.model_id());
        run.drive(&self.client, &self.executor, &emitter).await
    }
}

#[async_trait]
impl Runner for LoopRunner {
    async fn start(&self, request: RunRequest) -> Result<RunHandle> {
        let run_id = request.run_id;
        let cancel = request.cancel.clone();
        let runner = self.clone();
        let task = tokio::spawn(async move { runner.run(request).await });
        Ok(RunHandle {
            run_id,
            cancel,
            task,
        })
    }
}

/// One agent session: conversation, step counter and state.
pub struct AgentRun {
    run_id: RunId,
    model: String,
    max_steps: usize,
    step: usize,
    tool_executions: usize,
    state: RunState,
    conversation: Conversation,
    registry: Arc<ToolRegistry>,
    cancel: CancellationToken,
    usage: Usage,
}

impl AgentRun {
    pub fn new(request: RunRequest, model: impl Into<String>) -> Self {
        let system = prompts::system_prompt(&request.registry);
        Self {
            run_id: request.run_id,
            model: model.into(),
            max_steps: request.max_steps,
            step: 0,
            tool_executions: 0,
            state: RunState::Initialized,
            conversation: Conversation::new(system, request.instruction),
            registry: request.registry,
            cancel: request.cancel,
            usage: Usage::default(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    async fn drive(
        &mut self,
        client: &ModelClient,
        executor: &CommandExecutor,
        emitter: &RunEventEmitter,
    ) -> Result<RunOutcome> {
        info!(
            run_id = %self.run_id,
            model = %self.model,
            max_steps = self.max_steps,
            tools = ?self.registry.names(),
            "run started"
        );
        emitter.emit(
            0,
            RunEventPayload::Lifecycle {
                state: RunLifecycle::Started {
                    model: self.model.clone(),
                    max_steps: self.max_steps,
                },
            },
        );

        match self.drive_inner(client, executor, emitter).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let _ = self.state.advance(RunState::Failed);
                warn!(run_id = %self.run_id, step = self.step, error = %err, "run failed");
                emitter.emit(
                    self.step,
                    RunEventPayload::Lifecycle {
                        state: RunLifecycle::Failed {
                            error: err.to_string(),
                        },
                    },
                );
                Err(err)
            }
        }
    }

    async fn drive_inner(
        &mut self,
        client: &ModelClient,
        executor: &CommandExecutor,
        emitter: &RunEventEmitter,
    ) -> Result<RunOutcome> {
        let definitions: Vec<ToolDefinition> = self.registry.definitions();
        self.state.advance(RunState::Thinking)?;

        loop {
            if self.cancel.is_cancelled() {
                return Err(KubeAgentError::Canceled);
            }

            debug!(run_id = %self.run_id, step = self.step, "requesting model turn");
            let tools = (!definitions.is_empty()).then(|| definitions.clone());
            let reply = client
                .next_turn(self.conversation.messages(), tools, &self.cancel)
                .await?;
            self.usage.merge(&reply.usage);

            match reply.turn {
                ModelTurn::Final { text } => {
                    let answer = strip_terminate_marker(&text);
                    self.conversation.push_assistant(text)?;
                    self.state.advance(RunState::Completed)?;
                    info!(
                        run_id = %self.run_id,
                        steps = self.step,
                        tool_executions = self.tool_executions,
                        "run completed"
                    );
                    emitter.emit(self.step, RunEventPayload::FinalAnswer { text: answer.clone() });
                    emitter.emit(
                        self.step,
                        RunEventPayload::Lifecycle {
                            state: RunLifecycle::Completed,
                        },
                    );
                    return Ok(self.outcome(RunStatus::Completed, answer));
                }
                ModelTurn::ToolCalls { text, calls } => {
                    self.state.advance(RunState::Acting)?;
                    if !text.trim().is_empty() {
                        emitter.emit(self.step + 1, RunEventPayload::Reasoning { text: text.clone() });
                    }
                    let calls = distinct_call_ids(&self.run_id, calls);
                    self.conversation.push_tool_calls(text, calls.clone())?;

                    for call in &calls {
                        if self.cancel.is_cancelled() {
                            return Err(KubeAgentError::Canceled);
                        }
                        let result = self.execute_call(call, executor, emitter).await;
                        if self.cancel.is_cancelled() {
                            return Err(KubeAgentError::Canceled);
                        }
                        emitter.emit(
                            self.step + 1,
                            RunEventPayload::ToolResult {
                                result: result.clone(),
                            },
                        );
                        self.conversation.push_tool_result(result)?;
                    }

                    self.step += 1;
                    debug!(
                        run_id = %self.run_id,
                        step = self.step,
                        calls = calls.len(),
                        "step finished"
                    );

                    if self.step >= self.max_steps {
                        self.state.advance(RunState::Aborted)?;
                        warn!(
                            run_id = %self.run_id,
                            max_steps = self.max_steps,
                            "step limit reached before a final answer"
                        );
                        let summary = self.wrap_up(client).await;
                        emitter.emit(
                            self.step,
                            RunEventPayload::Lifecycle {
                                state: RunLifecycle::Aborted {
                                    max_steps: self.max_steps,
                                },
                            },
                        );
                        return Ok(self.outcome(RunStatus::Aborted, summary));
                    }

                    self.state.advance(RunState::Thinking)?;
                }
            }
        }
    }

    /// Resolve and run one tool call. Tool-level problems become failure
    /// results for the model; they never end the run.
    async fn execute_call(
        &mut self,
        call: &AgentToolCall,
        executor: &CommandExecutor,
        emitter: &RunEventEmitter,
    ) -> AgentToolResult {
        self.tool_executions += 1;
        let step = self.step + 1;

        let outcome = match self.registry.resolve(call) {
            Ok((tool, spec)) => {
                let mutating = tool.is_mutating();
                emitter.emit(
                    step,
                    RunEventPayload::ToolCallStarted {
                        call: call.clone(),
                        mutating,
                    },
                );
                debug!(run_id = %self.run_id, step, tool = %call.name, mutating, "executing tool");
                let ctx = ToolContext {
                    executor,
                    cancel: &self.cancel,
                    timeout: spec.timeout,
                };
                tool.execute(&ctx).await
            }
            Err(err) => {
                emitter.emit(
                    step,
                    RunEventPayload::ToolCallStarted {
                        call: call.clone(),
                        mutating: false,
                    },
                );
                ToolOutcome::from_error(&err)
            }
        };

        if let ToolOutcome::Failure {
            category, message, ..
        } = &outcome
        {
            warn!(
                run_id = %self.run_id,
                step,
                tool = %call.name,
                category = %category,
                "tool call failed: {message}"
            );
        }

        AgentToolResult::new(call, outcome)
    }

    /// Ask the model, without tools, for a summary of partial progress.
    async fn wrap_up(&mut self, client: &ModelClient) -> String {
        if self.conversation.push_user(WRAP_UP_PROMPT).is_ok() {
            match client
                .next_turn(self.conversation.messages(), None, &self.cancel)
                .await
            {
                Ok(reply) => {
                    self.usage.merge(&reply.usage);
                    let text = reply.turn.text().to_string();
                    if !text.trim().is_empty() && self.conversation.push_assistant(text.clone()).is_ok() {
                        return strip_terminate_marker(&text);
                    }
                }
                Err(err) => {
                    warn!(run_id = %self.run_id, error = %err, "wrap-up summary failed");
                }
            }
        }
        self.local_summary()
    }

    /// Summary built from the conversation when the model cannot provide one.
    fn local_summary(&self) -> String {
        let mut summary = format!(
            "Stopped after reaching the step limit of {} with {} tool execution(s) and no final answer.",
            self.max_steps, self.tool_executions
        );

        let last_reasoning = self
            .conversation
            .messages()
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.text())
            .find(|text| !text.trim().is_empty());
        if let Some(text) = last_reasoning {
            summary.push_str("\n\nLast reasoning:\n");
            summary.push_str(truncate_utf8(text.trim(), SUMMARY_EXCERPT_BYTES));
        }

        let last_result = self
            .conversation
            .messages()
            .iter()
            .rev()
            .find_map(|m| m.tool_result_part());
        if let Some(result) = last_result {
            let body = match &result.outcome {
                ToolOutcome::Success { stdout, .. } => stdout.as_str(),
                ToolOutcome::Failure { message, .. } => message.as_str(),
            };
            summary.push_str(&format!(
                "\n\nLast tool result ({}, {}):\n{}",
                result.tool_name,
                if result.is_error() { "failed" } else { "succeeded" },
                truncate_utf8(body.trim(), SUMMARY_EXCERPT_BYTES)
            ));
        }
        summary
    }

    fn outcome(&self, status: RunStatus, text: String) -> RunOutcome {
        RunOutcome {
            run_id: self.run_id,
            status,
            text,
            steps: self.step,
            max_steps: self.max_steps,
            tool_executions: self.tool_executions,
            usage: self.usage,
            conversation: self.conversation.clone(),
            finished_at: chrono::Utc::now(),
        }
    }
}

/// Rename repeated call ids within one turn (`id`, `id-2`, ...) so every call
/// gets its own answer.
fn distinct_call_ids(run_id: &RunId, calls: Vec<AgentToolCall>) -> Vec<AgentToolCall> {
    let mut seen = HashSet::new();
    calls
        .into_iter()
        .map(|mut call| {
            if !seen.contains(&call.id) {
                seen.insert(call.id.clone());
                return call;
            }
            let renamed = (2..)
                .map(|n| format!("{}-{n}", call.id))
                .find(|id| !seen.contains(id))
                .unwrap_or_default();
            warn!(run_id = %run_id, id = %call.id, renamed = %renamed, "model repeated a tool call id");
            seen.insert(renamed.clone());
            call.id = renamed;
            call
        })
        .collect()
}
