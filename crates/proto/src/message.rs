use serde::{Deserialize, Serialize, Serializer, ser::SerializeSeq};

/// Session id used when the caller does not name one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message authored by the caller.
    User,
    /// Message authored by the model.
    Assistant,
    /// System-level instruction message. Never stored in session memory.
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// Address of one conversation: `(provider, session_id)`.
///
/// Both parts are compared verbatim; no case folding or trimming happens.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Provider id the conversation is held with.
    pub provider: String,
    /// Caller-chosen session id.
    pub session_id: String,
}

impl SessionKey {
    /// Builds a key from provider and session ids.
    pub fn new(provider: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            session_id: session_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.session_id)
    }
}

/// A single stored exchange message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Either `user` or `assistant`.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ConversationTurn {
    /// Creates a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Snapshot of one session's history as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryView {
    pub provider: String,
    pub session_id: String,
    pub turns: Vec<ConversationTurn>,
    pub count: usize,
}

impl HistoryView {
    /// Wraps the turns stored under `key`.
    pub fn new(key: &SessionKey, turns: Vec<ConversationTurn>) -> Self {
        Self {
            provider: key.provider.clone(),
            session_id: key.session_id.clone(),
            count: turns.len(),
            turns,
        }
    }
}

/// Filter for a memory reset.
///
/// Precedence: both set removes one key, provider only removes every session of
/// that provider, session only removes that session under every provider,
/// neither removes everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetFilter {
    pub provider: Option<String>,
    pub session_id: Option<String>,
}

impl ResetFilter {
    /// Filter that clears every session.
    pub fn all() -> Self {
        Self::default()
    }

    /// Builds a filter, treating empty strings as absent.
    pub fn new(provider: Option<String>, session_id: Option<String>) -> Self {
        Self {
            provider: provider.filter(|p| !p.is_empty()),
            session_id: session_id.filter(|s| !s.is_empty()),
        }
    }

    /// Returns `true` when `key` falls under this filter.
    pub fn matches(&self, key: &SessionKey) -> bool {
        let provider_ok = self.provider.as_deref().is_none_or(|p| p == key.provider);
        let session_ok = self
            .session_id
            .as_deref()
            .is_none_or(|s| s == key.session_id);
        provider_ok && session_ok
    }

    /// Returns `true` when no filter is set.
    pub fn is_all(&self) -> bool {
        self.provider.is_none() && self.session_id.is_none()
    }
}

/// Keys removed by a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovedSessions {
    /// Everything was cleared. Serialized as `["ALL"]`.
    All,
    /// The listed keys were cleared.
    Keys(Vec<SessionKey>),
}

impl Serialize for RemovedSessions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RemovedSessions::All => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element("ALL")?;
                seq.end()
            }
            RemovedSessions::Keys(keys) => keys.serialize(serializer),
        }
    }
}

/// Body returned by a memory reset.
#[derive(Debug, Clone, Serialize)]
pub struct ResetOutcome {
    /// Always `cleared`.
    pub status: &'static str,
    pub removed_sessions: RemovedSessions,
}

impl ResetOutcome {
    pub fn cleared(removed_sessions: RemovedSessions) -> Self {
        Self {
            status: "cleared",
            removed_sessions,
        }
    }
}
