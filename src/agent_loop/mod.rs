//! Agent loop primitives (runs, conversation, events, prompts).

pub mod conversation;
pub mod events;
pub mod prompts;
pub mod runner;
pub mod state;
pub mod types;

pub use conversation::Conversation;
pub use events::*;
pub use runner::*;
pub use state::RunState;
pub use types::*;
