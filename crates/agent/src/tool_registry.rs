//! Tool registry used by the orchestrator to list and execute tools.

use std::collections::BTreeMap;
use std::sync::Arc;

use proto::{ToolCall, ToolDefinition, ToolResult};
use tools::{DateTimeTool, MarkdownTool, Tool};
use tracing::{debug, warn};

/// Registry of available tools
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in markdown and datetime tools.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(MarkdownTool);
        registry.register(DateTimeTool);
        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        debug!("Registering tool: {name}");
        self.tools.insert(name, Arc::new(tool));
    }

    /// Tool definitions in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// One prompt line per tool, newline-joined.
    pub fn prompt_listing(&self) -> String {
        self.definitions()
            .iter()
            .map(ToolDefinition::prompt_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Executes a tool call on the blocking pool.
    ///
    /// Unknown names are not an error: the result carries
    /// `Unknown action: <name>` so it can be handed back to the model.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name).cloned() else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return ToolResult::error(&call.name, format!("Unknown action: {}", call.name));
        };

        debug!(tool = %call.name, args = %call.arguments.len(), "Executing tool");
        let args = call.arguments.clone();
        match tokio::task::spawn_blocking(move || tool.execute(&args)).await {
            Ok(result) => result,
            Err(e) => ToolResult::error(&call.name, format!("Tool task join error: {e}")),
        }
    }

    /// Returns the list of registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` when no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
