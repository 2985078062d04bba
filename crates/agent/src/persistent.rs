//! Disk-backed session memory.
//!
//! Each session lives in `<root>/<hex(provider)>__<hex(session_id)>.json` as a
//! JSON array of turns. Hex encoding keeps arbitrary ids filesystem-safe and
//! lets resets recover keys from file names alone.

use std::{
    collections::{BTreeSet, HashMap},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use proto::{ConversationTurn, MemoryError, RemovedSessions, ResetFilter, SessionKey};
use tracing::{debug, warn};

use crate::memory::{SessionMemoryStore, select_removed};

const ARTIFACT_EXT: &str = "json";
const KEY_SEPARATOR: &str = "__";

/// Session store that survives restarts.
///
/// Histories are loaded lazily on first access and cached; every append
/// rewrites the session file through a temporary file and a rename.
pub struct FileMemoryStore {
    root: PathBuf,
    cache: Mutex<HashMap<SessionKey, Vec<ConversationTurn>>>,
}

impl FileMemoryStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the session files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `key`.
    pub fn artifact_path(&self, key: &SessionKey) -> PathBuf {
        self.root.join(artifact_name(key))
    }

    async fn load(&self, key: &SessionKey) -> Vec<ConversationTurn> {
        let path = self.artifact_path(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable session file, starting empty");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<ConversationTurn>>(&raw) {
            Ok(turns) => {
                debug!(session = %key, turns = turns.len(), "Session loaded from disk");
                turns
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt session file, starting empty");
                Vec::new()
            }
        }
    }

    async fn write(&self, key: &SessionKey, turns: &[ConversationTurn]) -> Result<(), MemoryError> {
        let bytes = serde_json::to_vec_pretty(turns)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| MemoryError::Storage(format!("create {}: {e}", self.root.display())))?;

        let path = self.artifact_path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| MemoryError::Storage(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| MemoryError::Storage(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    async fn remove_artifact(&self, key: &SessionKey) -> Result<(), MemoryError> {
        let path = self.artifact_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MemoryError::Storage(format!(
                "remove {}: {e}",
                path.display()
            ))),
        }
    }

    /// Session files currently on disk, as `(path, decoded key)` pairs.
    /// Files whose names do not decode get `None`.
    async fn artifacts(&self) -> Result<Vec<(PathBuf, Option<SessionKey>)>, MemoryError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "read {}: {e}",
                    self.root.display()
                )));
            }
        };

        let mut found = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXT) {
                continue;
            }
            let key = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_artifact_name);
            found.push((path, key));
        }
        Ok(found)
    }
}

#[async_trait]
impl SessionMemoryStore for FileMemoryStore {
    fn label(&self) -> &'static str {
        "history"
    }

    async fn history(&self, key: &SessionKey) -> Vec<ConversationTurn> {
        if let Some(turns) = self.cache.lock().get(key) {
            return turns.clone();
        }
        let loaded = self.load(key).await;
        self.cache
            .lock()
            .entry(key.clone())
            .or_insert(loaded)
            .clone()
    }

    /// The cache only changes once the file write succeeded. Appends to one
    /// key must be serialized by the caller.
    async fn append_all(
        &self,
        key: &SessionKey,
        turns: &[ConversationTurn],
    ) -> Result<(), MemoryError> {
        let mut updated = self.history(key).await;
        updated.extend_from_slice(turns);
        self.write(key, &updated).await?;
        debug!(session = %key, turns = updated.len(), "Session persisted");
        self.cache.lock().insert(key.clone(), updated);
        Ok(())
    }

    async fn reset(&self, filter: &ResetFilter) -> Result<RemovedSessions, MemoryError> {
        if filter.is_all() {
            self.cache.lock().clear();
            // Only files named after a session key belong to the store.
            for (path, key) in self.artifacts().await? {
                if key.is_none() {
                    continue;
                }
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| MemoryError::Storage(format!("remove {}: {e}", path.display())))?;
            }
            debug!(root = %self.root.display(), "All persisted sessions cleared");
            return Ok(RemovedSessions::All);
        }

        // Keys that were only read hold no turns and are not reported.
        let mut known: BTreeSet<SessionKey> = {
            let mut cache = self.cache.lock();
            cache.retain(|key, turns| !turns.is_empty() || !filter.matches(key));
            cache.keys().cloned().collect()
        };
        if filter.provider.is_none() || filter.session_id.is_none() {
            known.extend(
                self.artifacts()
                    .await?
                    .into_iter()
                    .filter_map(|(_, key)| key),
            );
        }

        let removed = select_removed(&known, filter);
        if let RemovedSessions::Keys(keys) = &removed {
            for key in keys {
                self.cache.lock().remove(key);
                self.remove_artifact(key).await?;
            }
        }
        debug!(?removed, "Persisted sessions reset");
        Ok(removed)
    }
}

fn artifact_name(key: &SessionKey) -> String {
    format!(
        "{}{KEY_SEPARATOR}{}.{ARTIFACT_EXT}",
        hex::encode(key.provider.as_bytes()),
        hex::encode(key.session_id.as_bytes())
    )
}

fn parse_artifact_name(name: &str) -> Option<SessionKey> {
    let stem = name.strip_suffix(".json")?;
    let (provider, session) = stem.split_once(KEY_SEPARATOR)?;
    let decode = |part: &str| {
        hex::decode(part)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    };
    let key = SessionKey::new(decode(provider)?, decode(session)?);
    // Only the canonical lowercase encoding maps back to the same path.
    (artifact_name(&key) == name).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(provider: &str, session: &str) -> SessionKey {
        SessionKey::new(provider, session)
    }

    async fn exchange(store: &FileMemoryStore, k: &SessionKey, n: usize) {
        store
            .append_all(
                k,
                &[
                    ConversationTurn::user(format!("q{n}")),
                    ConversationTurn::assistant(format!("a{n}")),
                ],
            )
            .await
            .expect("append");
    }

    #[test]
    fn artifact_names_round_trip_odd_ids() {
        let k = key("openai", "user/42 ñ__x");
        let name = artifact_name(&k);
        assert!(name.ends_with(".json"));
        assert!(!name.contains('/'));
        assert_eq!(parse_artifact_name(&name), Some(k));
    }

    #[test]
    fn foreign_file_names_are_not_keys() {
        assert_eq!(parse_artifact_name("notes.json"), None);
        assert_eq!(parse_artifact_name("zz__00.json"), None);
        assert_eq!(parse_artifact_name("6f__6f.txt"), None);
    }

    #[test]
    fn uppercase_hex_names_are_not_keys() {
        let canonical = artifact_name(&key("openai", "s1"));
        assert_eq!(parse_artifact_name(&canonical), Some(key("openai", "s1")));
        let shouted = canonical.to_uppercase().replace(".JSON", ".json");
        assert_eq!(parse_artifact_name(&shouted), None);
    }

    #[tokio::test]
    async fn history_survives_a_new_instance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let k = key("anthropic", "s1");
        {
            let store = FileMemoryStore::new(dir.path());
            exchange(&store, &k, 1).await;
            exchange(&store, &k, 2).await;
        }

        let reopened = FileMemoryStore::new(dir.path());
        let turns = reopened.history(&k).await;
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
    }

    #[tokio::test]
    async fn append_after_restart_extends_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let k = key("openai", "default");
        exchange(&FileMemoryStore::new(dir.path()), &k, 1).await;

        let store = FileMemoryStore::new(dir.path());
        exchange(&store, &k, 2).await;
        assert_eq!(FileMemoryStore::new(dir.path()).history(&k).await.len(), 4);
    }

    #[tokio::test]
    async fn writes_leave_no_temporary_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(dir.path());
        exchange(&store, &key("xai", "s"), 1).await;

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![artifact_name(&key("xai", "s"))]);
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(dir.path());
        let k = key("google", "broken");
        std::fs::write(store.artifact_path(&k), "{not json").expect("write");

        assert!(store.history(&k).await.is_empty());
        exchange(&store, &k, 1).await;
        assert_eq!(FileMemoryStore::new(dir.path()).history(&k).await.len(), 2);
    }

    #[tokio::test]
    async fn first_access_does_not_touch_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("sessions");
        let store = FileMemoryStore::new(&root);
        assert!(store.history(&key("openai", "new")).await.is_empty());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn exact_reset_removes_single_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(dir.path());
        exchange(&store, &key("openai", "s1"), 1).await;
        exchange(&store, &key("openai", "s2"), 1).await;

        let removed = store
            .reset(&ResetFilter::new(Some("openai".into()), Some("s1".into())))
            .await
            .expect("reset");
        assert_eq!(removed, RemovedSessions::Keys(vec![key("openai", "s1")]));
        assert!(!store.artifact_path(&key("openai", "s1")).exists());
        assert!(store.artifact_path(&key("openai", "s2")).exists());
    }

    #[tokio::test]
    async fn partial_reset_finds_sessions_only_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let writer = FileMemoryStore::new(dir.path());
            exchange(&writer, &key("openai", "s1"), 1).await;
            exchange(&writer, &key("openai", "s2"), 1).await;
            exchange(&writer, &key("xai", "s1"), 1).await;
        }

        // Fresh instance: nothing cached, everything must come from file names.
        let store = FileMemoryStore::new(dir.path());
        let removed = store
            .reset(&ResetFilter::new(Some("openai".into()), None))
            .await
            .expect("reset");
        assert_eq!(
            removed,
            RemovedSessions::Keys(vec![key("openai", "s1"), key("openai", "s2")])
        );
        assert!(store.history(&key("openai", "s1")).await.is_empty());
        assert_eq!(store.history(&key("xai", "s1")).await.len(), 2);

        let removed = FileMemoryStore::new(dir.path())
            .reset(&ResetFilter::new(None, Some("s1".into())))
            .await
            .expect("reset");
        assert_eq!(removed, RemovedSessions::Keys(vec![key("xai", "s1")]));
    }

    #[tokio::test]
    async fn full_reset_deletes_every_session_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(dir.path());
        exchange(&store, &key("openai", "s1"), 1).await;
        exchange(&store, &key("anthropic", "s9"), 1).await;
        std::fs::write(dir.path().join("README.txt"), "keep").expect("write");

        let removed = store.reset(&ResetFilter::all()).await.expect("reset");
        assert_eq!(removed, RemovedSessions::All);
        assert!(store.history(&key("openai", "s1")).await.is_empty());
        assert!(
            FileMemoryStore::new(dir.path())
                .history(&key("anthropic", "s9"))
                .await
                .is_empty()
        );
        assert!(dir.path().join("README.txt").exists());
    }

    #[tokio::test]
    async fn full_reset_keeps_unrelated_json_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(dir.path());
        exchange(&store, &key("openai", "s1"), 1).await;
        std::fs::write(dir.path().join("package.json"), "{}").expect("write");
        std::fs::write(dir.path().join("notes.json"), "[]").expect("write");

        let removed = store.reset(&ResetFilter::all()).await.expect("reset");
        assert_eq!(removed, RemovedSessions::All);
        assert!(!store.artifact_path(&key("openai", "s1")).exists());
        assert!(dir.path().join("package.json").exists());
        assert!(dir.path().join("notes.json").exists());
    }

    #[tokio::test]
    async fn partial_reset_skips_sessions_that_were_only_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(dir.path());
        exchange(&store, &key("openai", "s1"), 1).await;
        assert!(store.history(&key("openai", "peek")).await.is_empty());

        let removed = store
            .reset(&ResetFilter::new(Some("openai".into()), None))
            .await
            .expect("reset");
        assert_eq!(removed, RemovedSessions::Keys(vec![key("openai", "s1")]));
        assert!(store.history(&key("openai", "s1")).await.is_empty());
    }
}
