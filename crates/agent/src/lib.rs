//! Gateway core: LLM backends, provider catalog, session memory, structured
//! parsing, tool orchestration and the manager façade that composes them.

pub mod anthropic;
pub mod catalog;
pub mod gemini;
pub mod llm;
pub mod manager;
pub mod memory;
pub mod orchestrator;
pub mod persistent;
pub mod prompts;
pub mod structured;
pub mod tool_registry;

#[cfg(test)]
mod test_support;

/// Anthropic Messages API provider.
pub use anthropic::AnthropicProvider;
/// Provider registry and backend construction.
pub use catalog::{ApiKind, ProviderCatalog, ProviderEntry, connect};
/// Google Gemini provider.
pub use gemini::GeminiProvider;
/// Chat request/response models and provider interfaces.
pub use llm::{
    ChatMessage, ChatRequest, ChatResponse, LlmProvider, ModelTarget, OpenAiProvider, TokenUsage,
};
/// Manager façade and its injected policies.
pub use manager::{
    AskRequest, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GatewayManager, GatewayPolicies,
    MemoryPolicy, ParsingPolicy, ProviderStatus, ToolPolicy, resolve_provider,
};
/// Session memory stores.
pub use memory::{SessionMemoryStore, VolatileMemoryStore};
pub use persistent::FileMemoryStore;
/// Two-step tool protocol.
pub use orchestrator::{ToolOrchestrator, ToolRun};
/// JSON object recovery from model output.
pub use structured::parse_json_object;
/// Runtime tool registry.
pub use tool_registry::ToolRegistry;
