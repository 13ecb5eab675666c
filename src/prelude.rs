//! Convenience re-exports for common use.

pub use crate::agent_loop::{
    Conversation, LoopRunner, RunEvent, RunEventPayload, RunHandle, RunOutcome, RunRequest,
    RunState, RunStatus, Runner,
};
pub use crate::config::{AgentConfig, Credentials};
pub use crate::error::{KubeAgentError, Result};
pub use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
pub use crate::provider::{ModelClient, ModelProvider, ModelTurn};
pub use crate::tools::{KubeTool, ToolKind, ToolRegistry};
pub use crate::types::{
    AgentToolCall, AgentToolResult, ContentPart, GenerationSettings, ModelMessage, Role,
    ToolOutcome, Usage,
};
