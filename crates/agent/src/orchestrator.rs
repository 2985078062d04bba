//! Two-step tool protocol.
//!
//! The model is asked once with the tool list. If it names a tool, the tool
//! runs and the model is asked a second time with the output. There is never
//! a third call: any `tool_call` in the second reply is ignored.

use std::sync::Arc;

use proto::{GatewayError, StructuredAnswer, ToolCall};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    llm::{ChatMessage, LlmProvider, ModelTarget, TokenUsage},
    prompts,
    structured::parse_json_object,
    tool_registry::ToolRegistry,
};

/// Outcome of one orchestrated exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRun {
    pub answer: StructuredAnswer,
    /// Usage summed over both model calls.
    pub usage: TokenUsage,
}

/// Drives the tool protocol against a single backend.
#[derive(Clone)]
pub struct ToolOrchestrator {
    registry: Arc<ToolRegistry>,
}

impl ToolOrchestrator {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs the protocol for `prompt`.
    ///
    /// `context` is the system message plus prior turns and is sent ahead of
    /// both model calls. An unknown tool does not stop the exchange; its
    /// `Unknown action` text is passed to the second call like any output.
    pub async fn run(
        &self,
        llm: &dyn LlmProvider,
        target: &ModelTarget,
        context: &[ChatMessage],
        prompt: &str,
    ) -> Result<ToolRun, GatewayError> {
        let mut usage = TokenUsage::default();

        let first_prompt = prompts::tool_selection(prompt, &self.registry.prompt_listing());
        let first = ask_json(llm, target, context, first_prompt, &mut usage).await?;
        let first_answer = final_answer(&first).unwrap_or_default();

        let Some(call) = tool_call(&first) else {
            debug!(model = %target.model, "No tool requested");
            return Ok(ToolRun {
                answer: StructuredAnswer {
                    tool_call: None,
                    tool_output: None,
                    final_answer: first_answer,
                },
                usage,
            });
        };

        let result = self.registry.execute(&call).await;
        debug!(
            tool = %call.name,
            is_error = result.is_error,
            output_chars = result.output.len(),
            "Tool executed"
        );

        let follow_up = prompts::tool_follow_up(prompt, &call, &result.output);
        let second = ask_json(llm, target, context, follow_up, &mut usage).await?;
        let answer = final_answer(&second)
            .filter(|a| !a.is_empty())
            .unwrap_or(first_answer);

        Ok(ToolRun {
            answer: StructuredAnswer {
                tool_call: Some(call),
                tool_output: Some(result.output),
                final_answer: answer,
            },
            usage,
        })
    }
}

async fn ask_json(
    llm: &dyn LlmProvider,
    target: &ModelTarget,
    context: &[ChatMessage],
    prompt: String,
    usage: &mut TokenUsage,
) -> Result<Map<String, Value>, GatewayError> {
    let mut messages = context.to_vec();
    messages.push(ChatMessage::user(prompt));
    let response = llm.chat(target.request(messages)).await?;
    usage.add(&response.usage);
    parse_json_object(&response.text)
}

/// `final_answer` as trimmed text. Missing or null yields `None`.
fn final_answer(object: &Map<String, Value>) -> Option<String> {
    match object.get("final_answer")? {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

/// A tool call needs an object with a non-empty `name`. Arguments that are
/// not an object are replaced by an empty map.
fn tool_call(object: &Map<String, Value>) -> Option<ToolCall> {
    let Value::Object(call) = object.get("tool_call")? else {
        return None;
    };
    let name = call
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())?;
    let arguments = match call.get("arguments") {
        Some(Value::Object(args)) => args.clone(),
        _ => Map::new(),
    };
    Some(ToolCall::new(name, arguments))
}
