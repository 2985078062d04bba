use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tool::ToolCall;

/// Outcome of the two-step tool protocol.
///
/// `tool_output` is present exactly when `tool_call` is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub tool_call: Option<ToolCall>,
    pub tool_output: Option<String>,
    pub final_answer: String,
}

/// The `response` field of a successful query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Free-form model text.
    Text(String),
    /// Tool-mode answer.
    Tool(StructuredAnswer),
    /// Parsed structured-mode object.
    Structured(Map<String, Value>),
}

impl ResponsePayload {
    /// Flattens the payload to the text a streaming client should see.
    ///
    /// Structured objects yield the first non-empty of `answer`,
    /// `final_answer`, `distilled`, `summary`, falling back to their JSON.
    pub fn display_text(&self) -> String {
        match self {
            ResponsePayload::Text(text) => text.clone(),
            ResponsePayload::Tool(answer) => answer.final_answer.clone(),
            ResponsePayload::Structured(object) => ["answer", "final_answer", "distilled", "summary"]
                .iter()
                .filter_map(|key| object.get(*key).and_then(Value::as_str))
                .find(|value| !value.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(object.clone()).to_string()),
        }
    }
}

/// Result of a single `ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub provider: String,
    pub model: String,
    /// Literal prompt after template substitution.
    pub prompt: String,
    /// `None` on failure.
    pub response: Option<ResponsePayload>,
    /// Human-readable failure reason. Absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Short answer extracted from structured or tool responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_answer: Option<String>,
    /// Unparseable model text attached to a structured parse failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub session_id: String,
}

impl QueryResult {
    /// Builds a successful result.
    pub fn success(
        provider: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
        response: ResponsePayload,
    ) -> Self {
        Self {
            success: true,
            provider: provider.into(),
            model: model.into(),
            prompt: prompt.into(),
            response: Some(response),
            error: None,
            raw_answer: None,
            raw_response: None,
            temperature: 0.0,
            max_tokens: 0,
            session_id: String::new(),
        }
    }

    /// Builds a failed result.
    pub fn failure(
        provider: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            provider: provider.into(),
            model: model.into(),
            prompt: prompt.into(),
            response: None,
            error: Some(error.into()),
            raw_answer: None,
            raw_response: None,
            temperature: 0.0,
            max_tokens: 0,
            session_id: String::new(),
        }
    }

    /// Records the sampling parameters and session the query ran with.
    pub fn with_parameters(
        mut self,
        temperature: f32,
        max_tokens: u32,
        session_id: impl Into<String>,
    ) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self.session_id = session_id.into();
        self
    }
}

/// Success/failure counts for a fan-out query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySummary {
    pub total_providers: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Result of querying every available provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAllResult {
    /// `true` whenever at least one provider was queried, even if all failed.
    pub success: bool,
    pub prompt: String,
    /// Per-provider results keyed by provider id.
    pub responses: BTreeMap<String, QueryResult>,
    pub summary: QuerySummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryAllResult {
    /// Collects per-provider results and tallies the summary.
    pub fn collect(prompt: impl Into<String>, responses: BTreeMap<String, QueryResult>) -> Self {
        let successful = responses.values().filter(|r| r.success).count();
        let summary = QuerySummary {
            total_providers: responses.len(),
            successful,
            failed: responses.len() - successful,
        };
        Self {
            success: true,
            prompt: prompt.into(),
            responses,
            summary,
            error: None,
        }
    }

    /// Result when no provider could be queried.
    pub fn unavailable(prompt: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            prompt: prompt.into(),
            responses: BTreeMap::new(),
            summary: QuerySummary::default(),
            error: Some(error.into()),
        }
    }
}
