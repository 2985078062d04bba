//! Tool trait and built-in tool implementations.
//!
//! Tools are small, synchronous, local functions the model may ask the
//! gateway to run before it settles on a final answer.

pub mod datetime;
pub mod markdown;

pub use datetime::DateTimeTool;
pub use markdown::MarkdownTool;

use proto::{ToolDefinition, ToolResult};
use serde_json::{Map, Value};

/// Trait that all tools must implement
///
/// `execute` is synchronous; callers on an async runtime should move it onto
/// the blocking pool.
pub trait Tool: Send + Sync {
    /// Unique tool name exposed to the LLM.
    fn name(&self) -> &str;
    /// Human-readable description for tool selection.
    fn description(&self) -> &str;
    /// Parameter name and human-readable type/description pairs.
    fn parameters(&self) -> Vec<(&'static str, &'static str)>;
    /// Executes the tool with the given arguments.
    fn execute(&self, args: &Map<String, Value>) -> ToolResult;

    /// Metadata used to describe the tool in prompts.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

/// Reads `key` as text. Non-string JSON values are rendered, missing or null
/// values yield `None`.
pub(crate) fn string_arg(args: &Map<String, Value>, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
