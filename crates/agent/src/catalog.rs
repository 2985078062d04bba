//! Static registry of supported providers.

use std::sync::Arc;

use serde::Serialize;

use crate::{
    anthropic::AnthropicProvider,
    gemini::GeminiProvider,
    llm::{LlmProvider, OpenAiProvider},
};

/// Wire protocol a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI chat completions (also used by OpenAI-compatible hosts).
    OpenAiCompatible,
    /// Google Gemini `generateContent`.
    Gemini,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderEntry {
    /// Stable provider id (`openai`, `anthropic`, ...).
    pub id: String,
    /// Human-facing name.
    pub display_name: String,
    /// Model used for every call to this provider.
    pub default_model: String,
    /// Environment variable holding the API key.
    pub credential_key: String,
    /// Wire protocol.
    pub api: ApiKind,
    /// Endpoint override; `None` uses the SDK default.
    pub base_url: Option<String>,
}

impl ProviderEntry {
    fn new(
        id: &str,
        display_name: &str,
        default_model: &str,
        credential_key: &str,
        api: ApiKind,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            default_model: default_model.to_string(),
            credential_key: credential_key.to_string(),
            api,
            base_url: base_url.map(str::to_string),
        }
    }
}

/// Ordered provider registry. Iteration order is the fallback order used
/// when a requested provider is unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCatalog {
    entries: Vec<ProviderEntry>,
}

impl ProviderCatalog {
    /// The built-in providers in registry order.
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                ProviderEntry::new(
                    "anthropic",
                    "Anthropic Claude",
                    "claude-sonnet-4-6",
                    "ANTHROPIC_API_KEY",
                    ApiKind::Anthropic,
                    None,
                ),
                ProviderEntry::new(
                    "openai",
                    "OpenAI GPT",
                    "gpt-4o",
                    "OPENAI_API_KEY",
                    ApiKind::OpenAiCompatible,
                    None,
                ),
                ProviderEntry::new(
                    "google",
                    "Google Gemini",
                    "gemini-2.5-flash",
                    "GOOGLE_API_KEY",
                    ApiKind::Gemini,
                    None,
                ),
                ProviderEntry::new(
                    "xai",
                    "xAI Grok",
                    "grok-3-mini",
                    "XAI_API_KEY",
                    ApiKind::OpenAiCompatible,
                    Some("https://api.x.ai/v1"),
                ),
            ],
        }
    }

    /// Builds a catalog from explicit entries.
    pub fn from_entries(entries: Vec<ProviderEntry>) -> Self {
        Self { entries }
    }

    /// Looks up an entry by id.
    pub fn get(&self, id: &str) -> Option<&ProviderEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Mutable lookup, used to apply configuration overrides at startup.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut ProviderEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Entries in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.entries.iter()
    }

    /// Provider ids in registry order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    /// Default model for `id`, or `none` for unknown providers.
    pub fn model_for(&self, id: &str) -> &str {
        self.get(id).map_or("none", |e| e.default_model.as_str())
    }
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Constructs the backend client for `entry`.
pub fn connect(entry: &ProviderEntry, api_key: &str) -> Arc<dyn LlmProvider> {
    let base_url = entry.base_url.as_deref().filter(|u| !u.is_empty());
    match (entry.api, base_url) {
        (ApiKind::Anthropic, None) => Arc::new(AnthropicProvider::new(api_key)),
        (ApiKind::Anthropic, Some(url)) => Arc::new(AnthropicProvider::with_base_url(api_key, url)),
        (ApiKind::OpenAiCompatible, None) => Arc::new(OpenAiProvider::new(api_key)),
        (ApiKind::OpenAiCompatible, Some(url)) => {
            Arc::new(OpenAiProvider::with_base_url(api_key, url))
        }
        (ApiKind::Gemini, None) => Arc::new(GeminiProvider::new(api_key)),
        (ApiKind::Gemini, Some(url)) => Arc::new(GeminiProvider::with_base_url(api_key, url)),
    }
}
