//! Session-scoped conversation memory.
//!
//! Histories are addressed by [`SessionKey`] and only ever grow by appending.
//! Two stores implement [`SessionMemoryStore`]: [`VolatileMemoryStore`] keeps
//! everything in process memory, [`crate::persistent::FileMemoryStore`] mirrors
//! each session to a JSON file.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use proto::{ConversationTurn, MemoryError, RemovedSessions, ResetFilter, SessionKey};
use tracing::debug;

/// Keyed store of ordered conversation turns.
#[async_trait]
pub trait SessionMemoryStore: Send + Sync {
    /// Short label for status output (`memory`, `history`).
    fn label(&self) -> &'static str;

    /// Returns the turns stored under `key`, creating an empty history on
    /// first access.
    async fn history(&self, key: &SessionKey) -> Vec<ConversationTurn>;

    /// Appends `turns` in order as one write.
    async fn append_all(
        &self,
        key: &SessionKey,
        turns: &[ConversationTurn],
    ) -> Result<(), MemoryError>;

    /// Appends a single turn.
    async fn append(&self, key: &SessionKey, turn: ConversationTurn) -> Result<(), MemoryError> {
        self.append_all(key, std::slice::from_ref(&turn)).await
    }

    /// Removes the sessions selected by `filter`.
    async fn reset(&self, filter: &ResetFilter) -> Result<RemovedSessions, MemoryError>;
}

/// Applies the reset precedence to a set of known keys.
///
/// With both filters set the exact key is reported whether or not it exists.
pub(crate) fn select_removed<'a>(
    known: impl IntoIterator<Item = &'a SessionKey>,
    filter: &ResetFilter,
) -> RemovedSessions {
    match (&filter.provider, &filter.session_id) {
        (Some(provider), Some(session_id)) => {
            RemovedSessions::Keys(vec![SessionKey::new(provider.clone(), session_id.clone())])
        }
        (None, None) => RemovedSessions::All,
        _ => RemovedSessions::Keys(
            known
                .into_iter()
                .filter(|key| filter.matches(key))
                .cloned()
                .collect(),
        ),
    }
}

/// Process-lifetime memory store.
#[derive(Default)]
pub struct VolatileMemoryStore {
    sessions: RwLock<BTreeMap<SessionKey, Vec<ConversationTurn>>>,
}

impl VolatileMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently held.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` when no session is held.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionMemoryStore for VolatileMemoryStore {
    fn label(&self) -> &'static str {
        "memory"
    }

    async fn history(&self, key: &SessionKey) -> Vec<ConversationTurn> {
        if let Some(turns) = self.sessions.read().get(key) {
            return turns.clone();
        }
        self.sessions.write().entry(key.clone()).or_default().clone()
    }

    async fn append_all(
        &self,
        key: &SessionKey,
        turns: &[ConversationTurn],
    ) -> Result<(), MemoryError> {
        let mut sessions = self.sessions.write();
        let history = sessions.entry(key.clone()).or_default();
        history.extend_from_slice(turns);
        debug!(session = %key, turns = history.len(), "Session memory updated");
        Ok(())
    }

    async fn reset(&self, filter: &ResetFilter) -> Result<RemovedSessions, MemoryError> {
        let mut sessions = self.sessions.write();
        // Keys that were only read hold no turns and are not reported.
        sessions.retain(|key, turns| !turns.is_empty() || !filter.matches(key));
        let removed = select_removed(sessions.keys(), filter);
        match &removed {
            RemovedSessions::All => sessions.clear(),
            RemovedSessions::Keys(keys) => {
                for key in keys {
                    sessions.remove(key);
                }
            }
        }
        debug!(?removed, "Session memory reset");
        Ok(removed)
    }
}
