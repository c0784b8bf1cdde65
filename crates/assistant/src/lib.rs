//! ridgeline-assistant: directive composition.
//!
//! Turns a free-text directive plus assembled contact context into typed
//! actions via a bounded tool-calling conversation with a reasoning
//! backend.

pub mod compose;
pub mod context;
pub mod parser;
pub mod prompt;
pub mod tools;

pub use compose::{ComposeLoop, TOOL_ROUNDS, fallback_action};
pub use context::{ContactContext, ContextAssembler, ToolData};
pub use parser::parse_actions;
pub use tools::{HISTORY_CAP, ToolHandler, tool_definitions};
