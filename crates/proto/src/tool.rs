use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A model request to run a named local tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name as the model spelled it.
    pub name: String,
    /// Arguments keyed by parameter name.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Tool metadata shared with prompt templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// One-line description shown to the model.
    pub description: String,
    /// Parameter name to human-readable type/description.
    pub parameters: BTreeMap<String, String>,
}

impl ToolDefinition {
    /// Creates a definition from name, description and parameter pairs.
    pub fn new<'a>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Renders the definition as a single prompt line.
    pub fn prompt_line(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|(k, v)| format!("{k} ({v})"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("- {}: {} Params: {params}", self.name, self.description)
    }
}

/// Output of one tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that produced the output.
    pub tool_name: String,
    /// Text handed back to the model.
    pub output: String,
    /// Whether the tool reported a failure.
    pub is_error: bool,
}

impl ToolResult {
    /// Successful execution.
    pub fn success(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            output: output.into(),
            is_error: false,
        }
    }

    /// Failed execution. The message still reaches the model as plain text.
    pub fn error(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            output: message.into(),
            is_error: true,
        }
    }
}
