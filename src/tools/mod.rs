//! Tool system for function calling.

pub mod arguments;
pub mod manifest;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use registry::{ToolKind, ToolRegistry, ToolSpec};
pub use tool::{KubeTool, ToolContext};
pub use types::ToolParameters;
