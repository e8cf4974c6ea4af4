use super::{cutoff, is_expired, ConversationStore};
use crate::models::ConversationState;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

type Conversations = BTreeMap<String, ConversationState>;

/// Durable store backed by a single JSON document keyed by conversation id.
///
/// Saving is an upsert: an existing entry gets `version + 1`, a fresh
/// `updated_at` and keeps its `created_at`.
pub struct JsonFileConversationStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileConversationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Conversations> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Conversations::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Conversations::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            Error::Storage(format!(
                "Failed to parse conversation file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn write_all(&self, conversations: &Conversations) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(conversations)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for JsonFileConversationStore {
    async fn save_conversation(&self, id: &str, mut state: ConversationState) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut conversations = self.read_all().await?;

        match conversations.get(id) {
            Some(existing) => {
                state.version = Some(existing.version.unwrap_or(0) + 1);
                state.created_at = existing.created_at.or(state.created_at);
                state.updated_at = Some(Utc::now());
            }
            None => {
                let now = Utc::now();
                state.version = state.version.or(Some(1));
                state.created_at = state.created_at.or(Some(now));
                state.updated_at = state.updated_at.or(Some(now));
            }
        }

        tracing::debug!(
            conversation_id = id,
            version = state.version.unwrap_or(0),
            "Saving conversation state"
        );
        conversations.insert(id.to_string(), state);
        self.write_all(&conversations).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<ConversationState>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(id))
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut conversations = self.read_all().await?;
        if conversations.remove(id).is_some() {
            self.write_all(&conversations).await?;
        }
        Ok(())
    }

    async fn cleanup_expired_conversations(&self, older_than_hours: u64) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut conversations = self.read_all().await?;
        let cutoff = cutoff(older_than_hours);
        let before = conversations.len();
        conversations.retain(|_, state| !is_expired(state, cutoff));

        let removed = before - conversations.len();
        if removed > 0 {
            self.write_all(&conversations).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn make_store(dir: &TempDir) -> JsonFileConversationStore {
        JsonFileConversationStore::new(dir.path().join("state").join("conversations.json"))
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir);
        assert!(store.get_conversation("nope").await.unwrap().is_none());
        assert_eq!(store.cleanup_expired_conversations(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_increments_version_and_keeps_created_at() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir);

        store
            .save_conversation("c1", ConversationState::new("c1"))
            .await
            .unwrap();
        let first = store.get_conversation("c1").await.unwrap().unwrap();
        assert_eq!(first.version, Some(1));
        assert!(first.created_at.is_some());

        let mut update = first.clone();
        update.previous_response_id = Some("resp_2".to_string());
        update.created_at = None;
        store.save_conversation("c1", update).await.unwrap();
        store
            .save_conversation("c1", ConversationState::new("c1"))
            .await
            .unwrap();

        let stored = store.get_conversation("c1").await.unwrap().unwrap();
        assert_eq!(stored.version, Some(3));
        assert_eq!(stored.created_at, first.created_at);
        assert!(stored.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        make_store(&dir)
            .save_conversation("c1", ConversationState::new("c1"))
            .await
            .unwrap();

        let reopened = make_store(&dir);
        assert!(reopened.get_conversation("c1").await.unwrap().is_some());
        reopened.delete_conversation("c1").await.unwrap();
        assert!(make_store(&dir).get_conversation("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_sweep() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir);
        for (id, age) in [("old", Duration::hours(6)), ("recent", Duration::minutes(30))] {
            let state = ConversationState {
                updated_at: Some(Utc::now() - age),
                ..ConversationState::new(id)
            };
            store.save_conversation(id, state).await.unwrap();
        }

        assert_eq!(store.cleanup_expired_conversations(2).await.unwrap(), 1);
        assert!(store.get_conversation("old").await.unwrap().is_none());
        assert!(store.get_conversation("recent").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conversations.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileConversationStore::new(path);
        let err = store.get_conversation("c1").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
