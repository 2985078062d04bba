//! Scripted backends and tools shared by unit tests.

use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use proto::{LlmError, ToolResult};
use serde_json::{Map, Value};
use tools::Tool;

use crate::llm::{ChatRequest, ChatResponse, LlmProvider, TokenUsage};

/// Backend that replays queued replies and records every request.
pub(crate) struct MockLlm {
    queue: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlm {
    pub(crate) fn new(responses: Vec<Result<ChatResponse, LlmError>>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::from(responses)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Successful text replies, in order.
    pub(crate) fn replies(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|t| {
                    Ok(ChatResponse::new(
                        *t,
                        TokenUsage {
                            prompt_tokens: 10,
                            completion_tokens: 5,
                        },
                    ))
                })
                .collect(),
        )
    }

    /// Backend whose every call fails.
    pub(crate) fn failing(message: &str) -> Self {
        Self::new(vec![Err(LlmError::Api(message.to_string()))])
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().expect("lock requests").len()
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("lock requests").clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().expect("lock requests").push(req);
        self.queue
            .lock()
            .expect("lock queue")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("No mock response left".to_string())))
    }
}

/// Tool that counts executions and reports its arguments back.
pub(crate) struct CountingTool {
    pub(crate) runs: Arc<AtomicUsize>,
}

impl CountingTool {
    pub(crate) fn new() -> (Self, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        (Self { runs: runs.clone() }, runs)
    }
}

impl Tool for CountingTool {
    fn name(&self) -> &str {
        "lookup"
    }

    fn description(&self) -> &str {
        "Looks a value up"
    }

    fn parameters(&self) -> Vec<(&'static str, &'static str)> {
        vec![("key", "string - value to look up")]
    }

    fn execute(&self, args: &Map<String, Value>) -> ToolResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let key = args.get("key").and_then(Value::as_str).unwrap_or("?");
        ToolResult::success(self.name(), format!("value-of-{key}"))
    }
}
