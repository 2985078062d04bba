//! Gateway façade: provider resolution, memory, parsing and tool policies.
//!
//! Behavior is selected at construction through [`GatewayPolicies`] rather
//! than layered types. Every failure inside an exchange is folded into a
//! failed [`QueryResult`]; `ask` and `query_all` never return `Err`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use proto::{
    ConversationTurn, DEFAULT_SESSION_ID, GatewayError, HistoryView, QueryAllResult, QueryResult,
    ResetFilter, ResetOutcome, ResponsePayload, SessionKey,
};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::{
    catalog::{ProviderCatalog, ProviderEntry, connect},
    llm::{ChatMessage, LlmProvider, ModelTarget, TokenUsage},
    memory::SessionMemoryStore,
    orchestrator::ToolOrchestrator,
    prompts,
    structured::{parse_json_object, str_field},
    tool_registry::ToolRegistry,
};

/// Default generation budget.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ── Policies ───────────────────────────────────────────────────────────────────

/// Whether exchanges read and extend session history.
#[derive(Clone)]
pub enum MemoryPolicy {
    Stateless,
    Session(Arc<dyn SessionMemoryStore>),
}

/// How a plain (non-tool) reply is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsingPolicy {
    /// Reply text is returned as-is.
    Raw,
    /// Reply must contain the structured JSON object.
    Structured,
}

/// Whether the two-step tool protocol is used.
#[derive(Clone)]
pub enum ToolPolicy {
    Disabled,
    Enabled(Arc<ToolRegistry>),
}

/// Strategy set injected into [`GatewayManager`].
///
/// An enabled tool policy takes precedence over the parsing policy, since
/// the tool protocol always parses structured replies.
#[derive(Clone)]
pub struct GatewayPolicies {
    pub memory: MemoryPolicy,
    pub parsing: ParsingPolicy,
    pub tools: ToolPolicy,
}

impl Default for GatewayPolicies {
    fn default() -> Self {
        Self {
            memory: MemoryPolicy::Stateless,
            parsing: ParsingPolicy::Raw,
            tools: ToolPolicy::Disabled,
        }
    }
}

// ── Requests ───────────────────────────────────────────────────────────────────

/// Arguments of [`GatewayManager::ask`].
#[derive(Debug, Clone, PartialEq)]
pub struct AskRequest {
    pub topic: String,
    /// Preferred provider; falls back to the first available one.
    pub provider: Option<String>,
    /// Template with `{topic}` placeholders.
    pub template: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub session_id: String,
}

impl AskRequest {
    /// Request with default template, sampling and session.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            provider: None,
            template: prompts::DEFAULT_TEMPLATE.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            session_id: DEFAULT_SESSION_ID.to_string(),
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

/// Availability of one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub display_name: String,
    pub model: String,
    /// `ready` or `missing credential <KEY>`.
    pub status: String,
    #[serde(skip)]
    pub available: bool,
}

/// Picks the provider for a request.
///
/// The requested provider wins when it is available; otherwise the first
/// available provider in registry order; `None` when nothing is available.
pub fn resolve_provider(requested: Option<&str>, available: &[String]) -> Option<String> {
    match requested.filter(|p| !p.is_empty()) {
        Some(wanted) if available.iter().any(|p| p == wanted) => Some(wanted.to_string()),
        _ => available.first().cloned(),
    }
}

struct Exchange {
    payload: ResponsePayload,
    raw_answer: Option<String>,
    /// Text stored as the assistant turn.
    assistant_text: String,
    usage: TokenUsage,
}

// ── Manager ────────────────────────────────────────────────────────────────────

/// Entry point for every caller.
pub struct GatewayManager {
    catalog: ProviderCatalog,
    backends: HashMap<String, Arc<dyn LlmProvider>>,
    memory: MemoryPolicy,
    parsing: ParsingPolicy,
    orchestrator: Option<ToolOrchestrator>,
    system_prompt: String,
    session_locks: DashMap<SessionKey, Arc<Mutex<()>>>,
}

impl GatewayManager {
    /// Creates a manager with no backends.
    pub fn new(catalog: ProviderCatalog, policies: GatewayPolicies) -> Self {
        let orchestrator = match policies.tools {
            ToolPolicy::Disabled => None,
            ToolPolicy::Enabled(registry) => Some(ToolOrchestrator::new(registry)),
        };
        Self {
            catalog,
            backends: HashMap::new(),
            memory: policies.memory,
            parsing: policies.parsing,
            orchestrator,
            system_prompt: prompts::DEFAULT_SYSTEM_PROMPT.to_string(),
            session_locks: DashMap::new(),
        }
    }

    /// Connects a backend for every catalog entry `credential` yields a key for.
    pub fn from_credentials(
        catalog: ProviderCatalog,
        policies: GatewayPolicies,
        credential: impl Fn(&ProviderEntry) -> Option<String>,
    ) -> Self {
        let mut backends = HashMap::new();
        for entry in catalog.iter() {
            match credential(entry).filter(|k| !k.trim().is_empty()) {
                Some(key) => {
                    info!(provider = %entry.id, model = %entry.default_model, "Provider ready");
                    backends.insert(entry.id.clone(), connect(entry, &key));
                }
                None => debug!(
                    provider = %entry.id,
                    credential = %entry.credential_key,
                    "Provider skipped: no credential"
                ),
            }
        }
        let mut manager = Self::new(catalog, policies);
        manager.backends = backends;
        manager
    }

    /// Installs `backend` for provider `id`, replacing any existing one.
    pub fn with_backend(mut self, id: impl Into<String>, backend: Arc<dyn LlmProvider>) -> Self {
        self.backends.insert(id.into(), backend);
        self
    }

    /// Overrides the system prompt sent ahead of every call.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    /// Ids of providers with a backend, in registry order.
    pub fn available_providers(&self) -> Vec<String> {
        self.catalog
            .iter()
            .filter(|e| self.backends.contains_key(&e.id))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Status of every catalog entry.
    pub fn provider_statuses(&self) -> Vec<ProviderStatus> {
        self.catalog
            .iter()
            .map(|e| {
                let available = self.backends.contains_key(&e.id);
                ProviderStatus {
                    name: e.id.clone(),
                    display_name: e.display_name.clone(),
                    model: e.default_model.clone(),
                    status: if available {
                        "ready".to_string()
                    } else {
                        format!("missing credential {}", e.credential_key)
                    },
                    available,
                }
            })
            .collect()
    }

    /// Label describing the active policies, e.g. `llm-gateway+history+tools`.
    pub fn framework(&self) -> String {
        let mut label = String::from("llm-gateway");
        if let MemoryPolicy::Session(store) = &self.memory {
            label.push('+');
            label.push_str(store.label());
        }
        if self.orchestrator.is_some() {
            label.push_str("+tools");
        } else if self.parsing == ParsingPolicy::Structured {
            label.push_str("+structured");
        }
        label
    }

    pub fn memory_enabled(&self) -> bool {
        matches!(self.memory, MemoryPolicy::Session(_))
    }

    pub fn tools_enabled(&self) -> bool {
        self.orchestrator.is_some()
    }

    /// Answers one question. Never fails; errors become `success: false`.
    pub async fn ask(&self, req: AskRequest) -> QueryResult {
        let prompt = prompts::render(&req.template, &req.topic);
        let available = self.available_providers();

        let Some(provider) = resolve_provider(req.provider.as_deref(), &available) else {
            warn!(requested = ?req.provider, "No providers available");
            return QueryResult::failure(
                "none",
                "none",
                prompt,
                GatewayError::NoProviderAvailable.to_string(),
            )
            .with_parameters(req.temperature, req.max_tokens, req.session_id);
        };
        if let Some(requested) = req.provider.as_deref().filter(|p| *p != provider) {
            debug!(requested = %requested, provider = %provider, "Requested provider unavailable, falling back");
        }

        let model = self.catalog.model_for(&provider).to_string();
        let key = SessionKey::new(&provider, &req.session_id);
        let target = ModelTarget::new(&model, req.temperature, req.max_tokens);

        let result = match self.exchange(&key, &target, &prompt).await {
            Ok(exchange) => {
                debug!(
                    provider = %provider,
                    session_id = %req.session_id,
                    prompt_tokens = exchange.usage.prompt_tokens,
                    completion_tokens = exchange.usage.completion_tokens,
                    "Exchange completed"
                );
                let mut result =
                    QueryResult::success(&provider, &model, &prompt, exchange.payload);
                result.raw_answer = exchange.raw_answer;
                result
            }
            Err(e) => {
                warn!(provider = %provider, session_id = %req.session_id, error = %e, "Exchange failed");
                let mut result = QueryResult::failure(&provider, &model, &prompt, e.to_string());
                result.raw_response = e.raw_response().map(str::to_string);
                result
            }
        };
        result.with_parameters(req.temperature, req.max_tokens, req.session_id)
    }

    /// Asks every available provider in registry order, one at a time,
    /// under the default session.
    pub async fn query_all(
        &self,
        topic: &str,
        template: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> QueryAllResult {
        let prompt = prompts::render(template, topic);
        let available = self.available_providers();
        if available.is_empty() {
            return QueryAllResult::unavailable(prompt, GatewayError::NoProviderAvailable.to_string());
        }

        let mut responses = BTreeMap::new();
        for provider in available {
            let req = AskRequest::new(topic)
                .provider(&provider)
                .template(template)
                .max_tokens(max_tokens)
                .temperature(temperature);
            let result = self.ask(req).await;
            responses.insert(provider, result);
        }
        let all = QueryAllResult::collect(prompt, responses);
        info!(
            total = all.summary.total_providers,
            successful = all.summary.successful,
            "Query-all finished"
        );
        all
    }

    /// Turns stored for `(provider, session_id)`.
    pub async fn history(
        &self,
        provider: &str,
        session_id: &str,
    ) -> Result<HistoryView, GatewayError> {
        let MemoryPolicy::Session(store) = &self.memory else {
            return Err(GatewayError::MemoryUnsupported);
        };
        let key = SessionKey::new(provider, session_id);
        let turns = store.history(&key).await;
        Ok(HistoryView::new(&key, turns))
    }

    /// Clears the sessions selected by the optional filters.
    pub async fn reset_memory(
        &self,
        provider: Option<String>,
        session_id: Option<String>,
    ) -> Result<ResetOutcome, GatewayError> {
        let MemoryPolicy::Session(store) = &self.memory else {
            return Err(GatewayError::MemoryUnsupported);
        };
        let filter = ResetFilter::new(provider, session_id);
        let removed = store.reset(&filter).await?;
        self.session_locks
            .retain(|key, lock| Arc::strong_count(lock) > 1 || !filter.matches(key));
        info!(?filter, "Session memory reset");
        Ok(ResetOutcome::cleared(removed))
    }

    /// Serializes exchanges on one key.
    async fn lock_session(&self, key: &SessionKey) -> OwnedMutexGuard<()> {
        let lock = self.session_locks.entry(key.clone()).or_default().clone();
        lock.lock_owned().await
    }

    /// Drops the lock entry for `key` once no task holds or awaits it.
    fn release_session(&self, key: &SessionKey) {
        self.session_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn exchange(
        &self,
        key: &SessionKey,
        target: &ModelTarget,
        prompt: &str,
    ) -> Result<Exchange, GatewayError> {
        let backend = self
            .backends
            .get(&key.provider)
            .cloned()
            .ok_or(GatewayError::NoProviderAvailable)?;

        let MemoryPolicy::Session(_) = &self.memory else {
            return self.exchange_locked(backend, key, target, prompt).await;
        };
        // Held from history read to append so turns of one key never interleave.
        let guard = self.lock_session(key).await;
        let result = self.exchange_locked(backend, key, target, prompt).await;
        drop(guard);
        self.release_session(key);
        result
    }

    async fn exchange_locked(
        &self,
        backend: Arc<dyn LlmProvider>,
        key: &SessionKey,
        target: &ModelTarget,
        prompt: &str,
    ) -> Result<Exchange, GatewayError> {
        let mut context = vec![ChatMessage::system(&self.system_prompt)];
        if let MemoryPolicy::Session(store) = &self.memory {
            context.extend(store.history(key).await.iter().map(ChatMessage::from));
        }

        let exchange = match &self.orchestrator {
            Some(orchestrator) => {
                let run = orchestrator
                    .run(backend.as_ref(), target, &context, prompt)
                    .await?;
                let answer = run.answer.final_answer.clone();
                Exchange {
                    payload: ResponsePayload::Tool(run.answer),
                    raw_answer: Some(answer.clone()),
                    assistant_text: answer,
                    usage: run.usage,
                }
            }
            None => {
                let user_prompt = match self.parsing {
                    ParsingPolicy::Raw => prompt.to_string(),
                    ParsingPolicy::Structured => prompts::structured(prompt),
                };
                context.push(ChatMessage::user(user_prompt));
                let response = backend.chat(target.request(context)).await?;
                match self.parsing {
                    ParsingPolicy::Raw => Exchange {
                        payload: ResponsePayload::Text(response.text.clone()),
                        raw_answer: None,
                        assistant_text: response.text,
                        usage: response.usage,
                    },
                    ParsingPolicy::Structured => {
                        let object = parse_json_object(&response.text)?;
                        let raw_answer = str_field(&object, "answer")
                            .map(str::to_string)
                            .unwrap_or_else(|| response.text.clone());
                        Exchange {
                            payload: ResponsePayload::Structured(object),
                            raw_answer: Some(raw_answer),
                            assistant_text: response.text,
                            usage: response.usage,
                        }
                    }
                }
            }
        };

        if let MemoryPolicy::Session(store) = &self.memory {
            store
                .append_all(
                    key,
                    &[
                        ConversationTurn::user(prompt),
                        ConversationTurn::assistant(exchange.assistant_text.clone()),
                    ],
                )
                .await?;
        }
        Ok(exchange)
    }
}

#[cfg(test)]
mod tests {
    use proto::{RemovedSessions, Role};
    use serde_json::Value;

    use super::*;
    use crate::memory::VolatileMemoryStore;
    use crate::persistent::FileMemoryStore;
    use crate::test_support::{CountingTool, MockLlm};

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn with_memory() -> GatewayPolicies {
        GatewayPolicies {
            memory: MemoryPolicy::Session(Arc::new(VolatileMemoryStore::new())),
            ..GatewayPolicies::default()
        }
    }

    fn manager(policies: GatewayPolicies, backends: Vec<(&str, Arc<MockLlm>)>) -> GatewayManager {
        backends
            .into_iter()
            .fold(GatewayManager::new(ProviderCatalog::builtin(), policies), |m, (id, llm)| {
                m.with_backend(id, llm)
            })
    }

    // ── resolve_provider ──

    #[test]
    fn resolve_prefers_requested_available_provider() {
        let available = ids(&["openai", "xai"]);
        assert_eq!(
            resolve_provider(Some("xai"), &available).as_deref(),
            Some("xai")
        );
    }

    #[test]
    fn resolve_falls_back_to_first_available() {
        let available = ids(&["openai", "xai"]);
        assert_eq!(
            resolve_provider(Some("anthropic"), &available).as_deref(),
            Some("openai")
        );
        assert_eq!(resolve_provider(None, &available).as_deref(), Some("openai"));
        assert_eq!(resolve_provider(Some(""), &available).as_deref(), Some("openai"));
    }

    #[test]
    fn resolve_with_nothing_available_is_none() {
        assert_eq!(resolve_provider(Some("openai"), &[]), None);
        assert_eq!(resolve_provider(None, &[]), None);
    }

    // ── ask ──

    #[tokio::test]
    async fn ask_without_providers_reports_none() {
        let manager = manager(GatewayPolicies::default(), vec![]);
        let result = manager.ask(AskRequest::new("hi")).await;
        assert!(!result.success);
        assert_eq!(result.provider, "none");
        assert_eq!(result.model, "none");
        assert_eq!(result.error.as_deref(), Some("No providers available"));
        assert_eq!(result.session_id, "default");
        assert_eq!(result.max_tokens, 1000);
    }

    #[tokio::test]
    async fn ask_substitutes_template_and_reports_parameters() {
        let llm = Arc::new(MockLlm::replies(&["Paris"]));
        let manager = manager(GatewayPolicies::default(), vec![("openai", llm.clone())]);

        let result = manager
            .ask(
                AskRequest::new("France")
                    .template("Capital of {topic}? Answer for {topic}.")
                    .max_tokens(50)
                    .temperature(0.2)
                    .session("s9"),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.provider, "openai");
        assert_eq!(result.model, "gpt-4o");
        assert_eq!(result.prompt, "Capital of France? Answer for France.");
        assert_eq!(result.response, Some(ResponsePayload::Text("Paris".into())));
        assert_eq!(result.session_id, "s9");
        assert_eq!(result.max_tokens, 50);

        let requests = llm.requests();
        let req = &requests[0];
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.max_tokens, 50);
        assert_eq!(req.messages[0], ChatMessage::system("You are a helpful AI assistant."));
        assert_eq!(req.messages[1], ChatMessage::user("Capital of France? Answer for France."));
    }

    #[tokio::test]
    async fn ask_falls_back_when_requested_provider_missing() {
        let llm = Arc::new(MockLlm::replies(&["hello"]));
        let manager = manager(GatewayPolicies::default(), vec![("xai", llm)]);
        let result = manager.ask(AskRequest::new("hi").provider("anthropic")).await;
        assert!(result.success);
        assert_eq!(result.provider, "xai");
        assert_eq!(result.model, "grok-3-mini");
    }

    #[tokio::test]
    async fn backend_failure_is_a_failed_result() {
        let llm = Arc::new(MockLlm::failing("HTTP 500 Internal Server Error: boom"));
        let manager = manager(with_memory(), vec![("openai", llm)]);

        let result = manager.ask(AskRequest::new("hi").session("s1")).await;
        assert!(!result.success);
        assert!(result.response.is_none());
        assert!(result.error.as_deref().is_some_and(|e| e.contains("boom")));

        let history = manager.history("openai", "s1").await.expect("history");
        assert_eq!(history.count, 0);
    }

    // ── memory ──

    #[tokio::test]
    async fn successful_exchanges_append_two_turns_each() {
        let llm = Arc::new(MockLlm::replies(&["a1", "a2", "a3"]));
        let manager = manager(with_memory(), vec![("anthropic", llm)]);

        for q in ["q1", "q2", "q3"] {
            let result = manager.ask(AskRequest::new(q).session("s1")).await;
            assert!(result.success);
        }

        let history = manager.history("anthropic", "s1").await.expect("history");
        assert_eq!(history.count, 6);
        for (i, turn) in history.turns.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }
        assert_eq!(history.turns[4].content, "q3");
        assert_eq!(history.turns[5].content, "a3");
    }

    #[tokio::test]
    async fn second_call_sees_first_exchange_as_context() {
        let llm = Arc::new(MockLlm::replies(&["4", "You asked what 2+2 is."]));
        let manager = manager(with_memory(), vec![("openai", llm.clone())]);

        manager
            .ask(AskRequest::new("What is 2+2?").provider("openai").session("s1"))
            .await;
        manager
            .ask(AskRequest::new("What did I just ask?").provider("openai").session("s1"))
            .await;

        let requests = llm.requests();
        assert_eq!(
            requests[1].messages,
            vec![
                ChatMessage::system("You are a helpful AI assistant."),
                ChatMessage::user("What is 2+2?"),
                ChatMessage::assistant("4"),
                ChatMessage::user("What did I just ask?"),
            ]
        );
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let llm = Arc::new(MockLlm::replies(&["one", "two"]));
        let manager = manager(with_memory(), vec![("openai", llm.clone())]);
        manager.ask(AskRequest::new("first").session("a")).await;
        manager.ask(AskRequest::new("second").session("b")).await;

        assert_eq!(llm.requests()[1].messages.len(), 2);
        assert_eq!(manager.history("openai", "a").await.expect("a").count, 2);
        assert_eq!(manager.history("openai", "b").await.expect("b").count, 2);
    }

    #[tokio::test]
    async fn concurrent_asks_on_one_session_do_not_interleave() {
        let replies: Vec<String> = (0..8).map(|i| format!("a{i}")).collect();
        let refs: Vec<&str> = replies.iter().map(String::as_str).collect();
        let llm = Arc::new(MockLlm::replies(&refs));
        let manager = Arc::new(manager(with_memory(), vec![("openai", llm)]));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .ask(AskRequest::new(format!("q{i}")).session("shared"))
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.expect("join").success);
        }

        let history = manager.history("openai", "shared").await.expect("history");
        assert_eq!(history.count, 16);
        for pair in history.turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
        }
    }

    #[tokio::test]
    async fn session_locks_are_released_after_each_exchange() {
        let replies: Vec<String> = (0..50).map(|i| format!("a{i}")).collect();
        let refs: Vec<&str> = replies.iter().map(String::as_str).collect();
        let llm = Arc::new(MockLlm::replies(&refs));
        let manager = manager(with_memory(), vec![("openai", llm)]);

        for i in 0..50 {
            let result = manager
                .ask(AskRequest::new("hi").session(format!("visitor-{i}")))
                .await;
            assert!(result.success);
        }
        assert_eq!(manager.session_locks.len(), 0);
        assert_eq!(
            manager
                .history("openai", "visitor-7")
                .await
                .expect("history")
                .count,
            2
        );
    }

    #[tokio::test]
    async fn reset_prunes_idle_session_locks() {
        let manager = manager(with_memory(), vec![]);
        for (p, s) in [("openai", "s1"), ("openai", "s2"), ("xai", "s1")] {
            manager
                .session_locks
                .insert(SessionKey::new(p, s), Arc::default());
        }
        let busy = manager
            .session_locks
            .get(&SessionKey::new("xai", "s1"))
            .map(|entry| entry.value().clone())
            .expect("lock entry");

        manager
            .reset_memory(Some("openai".into()), None)
            .await
            .expect("reset");
        assert_eq!(manager.session_locks.len(), 1);

        manager.reset_memory(None, None).await.expect("reset");
        assert_eq!(manager.session_locks.len(), 1);
        drop(busy);
        manager.reset_memory(None, None).await.expect("reset");
        assert!(manager.session_locks.is_empty());
    }

    #[tokio::test]
    async fn stateless_manager_rejects_memory_operations() {
        let manager = manager(GatewayPolicies::default(), vec![]);
        assert!(matches!(
            manager.history("openai", "default").await,
            Err(GatewayError::MemoryUnsupported)
        ));
        assert!(matches!(
            manager.reset_memory(None, None).await,
            Err(GatewayError::MemoryUnsupported)
        ));
    }

    #[tokio::test]
    async fn reset_exact_session_keeps_siblings() {
        let llm = Arc::new(MockLlm::replies(&["1", "2"]));
        let manager = manager(with_memory(), vec![("openai", llm)]);
        manager.ask(AskRequest::new("x").session("s1")).await;
        manager.ask(AskRequest::new("y").session("s2")).await;

        let outcome = manager
            .reset_memory(Some("openai".into()), Some("s1".into()))
            .await
            .expect("reset");
        assert_eq!(outcome.status, "cleared");
        assert_eq!(
            outcome.removed_sessions,
            RemovedSessions::Keys(vec![SessionKey::new("openai", "s1")])
        );
        assert_eq!(manager.history("openai", "s1").await.expect("s1").count, 0);
        assert_eq!(manager.history("openai", "s2").await.expect("s2").count, 2);
    }

    #[tokio::test]
    async fn persistent_history_survives_manager_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let policies = || GatewayPolicies {
            memory: MemoryPolicy::Session(Arc::new(FileMemoryStore::new(dir.path()))),
            ..GatewayPolicies::default()
        };

        let first = manager(policies(), vec![("google", Arc::new(MockLlm::replies(&["42"])))]);
        assert_eq!(first.framework(), "llm-gateway+history");
        first.ask(AskRequest::new("answer?").session("s")).await;
        drop(first);

        let llm = Arc::new(MockLlm::replies(&["still 42"]));
        let second = manager(policies(), vec![("google", llm.clone())]);
        second.ask(AskRequest::new("again?").session("s")).await;
        assert_eq!(llm.requests()[0].messages.len(), 4);

        let outcome = second.reset_memory(None, None).await.expect("reset");
        assert_eq!(outcome.removed_sessions, RemovedSessions::All);
    }

    // ── structured ──

    fn structured() -> GatewayPolicies {
        GatewayPolicies {
            parsing: ParsingPolicy::Structured,
            ..with_memory()
        }
    }

    #[tokio::test]
    async fn structured_reply_becomes_object_with_raw_answer() {
        let reply = "```json\n{\"answer\": \"4\", \"summary\": \"addition\", \"keywords\": [\"math\"], \"distilled\": \"4\"}\n```";
        let llm = Arc::new(MockLlm::replies(&[reply]));
        let manager = manager(structured(), vec![("openai", llm.clone())]);
        assert_eq!(manager.framework(), "llm-gateway+memory+structured");

        let result = manager.ask(AskRequest::new("What is 2+2?")).await;
        assert!(result.success);
        assert_eq!(result.raw_answer.as_deref(), Some("4"));
        let Some(ResponsePayload::Structured(object)) = &result.response else {
            panic!("expected structured payload");
        };
        assert_eq!(object["summary"], Value::from("addition"));

        let requests = llm.requests();
        let sent = &requests[0].messages[1].content;
        assert!(sent.contains("\"distilled\""));
        assert!(sent.ends_with("Topic: What is 2+2?"));

        let history = manager.history("openai", "default").await.expect("history");
        assert_eq!(history.turns[0].content, "What is 2+2?");
        assert_eq!(history.turns[1].content, reply);
    }

    #[tokio::test]
    async fn structured_parse_failure_appends_nothing() {
        let llm = Arc::new(MockLlm::replies(&["I'd rather not use JSON."]));
        let manager = manager(structured(), vec![("openai", llm)]);

        let result = manager.ask(AskRequest::new("q")).await;
        assert!(!result.success);
        assert!(result.response.is_none());
        assert!(
            result
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("Failed to parse structured JSON response:"))
        );
        assert_eq!(result.raw_response.as_deref(), Some("I'd rather not use JSON."));
        assert_eq!(manager.history("openai", "default").await.expect("h").count, 0);
    }

    // ── tools ──

    #[tokio::test]
    async fn tool_mode_returns_structured_answer_and_stores_final_answer() {
        let (tool, runs) = CountingTool::new();
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        let policies = GatewayPolicies {
            tools: ToolPolicy::Enabled(Arc::new(registry)),
            ..with_memory()
        };
        let llm = Arc::new(MockLlm::replies(&[
            r#"{"tool_call": {"name": "lookup", "arguments": {"key": "k"}}, "final_answer": ""}"#,
            r#"{"tool_call": null, "final_answer": "k maps to value-of-k"}"#,
        ]));
        let manager = manager(policies, vec![("openai", llm.clone())]);
        assert_eq!(manager.framework(), "llm-gateway+memory+tools");

        let result = manager.ask(AskRequest::new("what is k?")).await;
        assert!(result.success);
        assert_eq!(llm.calls(), 2);
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(result.raw_answer.as_deref(), Some("k maps to value-of-k"));
        let Some(ResponsePayload::Tool(answer)) = &result.response else {
            panic!("expected tool payload");
        };
        assert_eq!(answer.tool_output.as_deref(), Some("value-of-k"));

        let history = manager.history("openai", "default").await.expect("history");
        assert_eq!(history.turns[1].content, "k maps to value-of-k");
    }

    // ── query_all ──

    #[tokio::test]
    async fn query_all_reports_partial_failure() {
        let good = Arc::new(MockLlm::replies(&["fine"]));
        let bad = Arc::new(MockLlm::failing("unreachable"));
        let manager = manager(
            GatewayPolicies::default(),
            vec![("anthropic", good), ("openai", bad)],
        );

        let all = manager.query_all("ping", "{topic}", 100, 0.5).await;
        assert!(all.success);
        assert!(all.responses["anthropic"].success);
        assert!(!all.responses["openai"].success);
        assert_eq!(all.summary.total_providers, 2);
        assert_eq!(all.summary.successful, 1);
        assert_eq!(all.summary.failed, 1);
        assert_eq!(all.responses["openai"].provider, "openai");
    }

    #[tokio::test]
    async fn query_all_without_providers_is_unavailable() {
        let manager = manager(GatewayPolicies::default(), vec![]);
        let all = manager.query_all("ping", "{topic}", 100, 0.5).await;
        assert!(!all.success);
        assert!(all.responses.is_empty());
        assert_eq!(all.error.as_deref(), Some("No providers available"));
    }

    // ── status ──

    #[test]
    fn statuses_mark_missing_credentials() {
        let manager = manager(
            GatewayPolicies::default(),
            vec![("google", Arc::new(MockLlm::replies(&[])))],
        );
        assert_eq!(manager.available_providers(), vec!["google"]);
        let statuses = manager.provider_statuses();
        assert_eq!(statuses.len(), 4);
        assert_eq!(statuses[0].status, "missing credential ANTHROPIC_API_KEY");
        assert_eq!(statuses[2].status, "ready");
        assert!(statuses[2].available);
        assert_eq!(manager.framework(), "llm-gateway");
    }

    #[test]
    fn from_credentials_connects_only_entries_with_keys() {
        let manager = GatewayManager::from_credentials(
            ProviderCatalog::builtin(),
            GatewayPolicies::default(),
            |entry| (entry.id == "xai").then(|| "test-key".to_string()),
        );
        assert_eq!(manager.available_providers(), vec!["xai"]);
    }
}
