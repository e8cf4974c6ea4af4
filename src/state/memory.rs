use super::{cutoff, is_expired, ConversationStore};
use crate::models::ConversationState;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Process-local store. Saves overwrite; the lock is never held across an await.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: Mutex<HashMap<String, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.conversations().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn conversations(&self) -> MutexGuard<'_, HashMap<String, ConversationState>> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn save_conversation(&self, id: &str, state: ConversationState) -> Result<()> {
        self.conversations().insert(id.to_string(), state);
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<ConversationState>> {
        Ok(self.conversations().get(id).cloned())
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.conversations().remove(id);
        Ok(())
    }

    async fn cleanup_expired_conversations(&self, older_than_hours: u64) -> Result<usize> {
        let cutoff = cutoff(older_than_hours);
        let mut conversations = self.conversations();
        let before = conversations.len();
        conversations.retain(|_, state| !is_expired(state, cutoff));
        Ok(before - conversations.len())
    }
}
