//! Prompt templates for structured and tool modes.

use proto::ToolCall;

/// Placeholder replaced by the caller's topic.
pub const TOPIC_PLACEHOLDER: &str = "{topic}";

/// Template used when the caller does not provide one.
pub const DEFAULT_TEMPLATE: &str = "{topic}";

/// System prompt prepended to every model call unless configured otherwise.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Substitutes every occurrence of `{topic}` in `template`.
pub fn render(template: &str, topic: &str) -> String {
    template.replace(TOPIC_PLACEHOLDER, topic)
}

/// Wraps `prompt` in the instruction asking for the fixed structured shape.
pub fn structured(prompt: &str) -> String {
    format!(
        r#"Given the topic below, provide:

1. A direct factual answer (if possible)
2. A summary of what the question is about
3. Relevant keywords
4. A distilled answer (short phrase or value-only form of the answer)

Respond in the following JSON format:
{{
  "answer": "...",
  "summary": "...",
  "keywords": ["...", "..."],
  "distilled": "..."
}}

Topic: {prompt}"#
    )
}

/// First-step prompt of the tool protocol. `tools` holds one line per tool.
pub fn tool_selection(prompt: &str, tools: &str) -> String {
    format!(
        r#"You are a helpful assistant with access to external tools.

Available tools:
{tools}

For every response, return strict JSON with this shape:
{{
  "tool_call": null OR {{"name": "tool_name", "arguments": {{"arg": "value"}}}},
  "final_answer": "string"
}}

Rules:
- If no tool is needed, set tool_call to null.
- If a tool is needed, set tool_call and keep final_answer short (what you expect to answer after tool execution).
- Return JSON only.

User topic: {prompt}"#
    )
}

/// Second-step prompt carrying the executed call and its output.
pub fn tool_follow_up(prompt: &str, call: &ToolCall, output: &str) -> String {
    let call_json = serde_json::to_string(call).unwrap_or_else(|_| call.name.clone());
    format!(
        r#"You already requested a tool and now have the result.

Original user topic: {prompt}
Tool call: {call_json}
Tool output: {output}

Return strict JSON:
{{
  "tool_call": null,
  "final_answer": "final response for the user"
}}"#
    )
}
