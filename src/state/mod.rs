//! Conversation state persistence
//!
//! [`ConversationStore`] is the storage seam; [`ConversationStateManager`] is
//! the only writer of conversation state and owns the versioning rules.

pub mod file;
pub mod memory;

pub use file::JsonFileConversationStore;
pub use memory::InMemoryConversationStore;

use crate::context::{ContextOptimization, ContextOptimizationRequest, ConversationContextManager};
use crate::models::{ContextMetadata, ConversationState};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert or replace the state stored under `id`.
    async fn save_conversation(&self, id: &str, state: ConversationState) -> Result<()>;
    async fn get_conversation(&self, id: &str) -> Result<Option<ConversationState>>;
    async fn delete_conversation(&self, id: &str) -> Result<()>;
    /// Remove entries last updated more than `older_than_hours` ago and return
    /// how many were removed. Entries without `updated_at` are kept.
    async fn cleanup_expired_conversations(&self, older_than_hours: u64) -> Result<usize>;
}

pub(crate) fn is_expired(state: &ConversationState, cutoff: DateTime<Utc>) -> bool {
    state.updated_at.is_some_and(|updated| updated < cutoff)
}

pub(crate) fn cutoff(older_than_hours: u64) -> DateTime<Utc> {
    let hours = i64::try_from(older_than_hours).unwrap_or(i64::MAX);
    Duration::try_hours(hours)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// One completed turn to fold into a conversation's state.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub conversation_id: String,
    pub user_id: Option<String>,
    pub response_id: String,
    pub turn_tokens: u64,
    pub max_tokens: Option<u64>,
}

pub struct ConversationStateManager {
    store: Arc<dyn ConversationStore>,
    context: ConversationContextManager,
}

impl ConversationStateManager {
    pub fn new(store: Arc<dyn ConversationStore>, context: ConversationContextManager) -> Self {
        Self { store, context }
    }

    pub async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>> {
        self.store.get_conversation(conversation_id).await
    }

    /// Apply `turn` to the stored state and persist it.
    ///
    /// The first turn creates version 1; every later turn bumps the version,
    /// turn count, token total and last activity.
    pub async fn record_turn(
        &self,
        turn: TurnRecord,
    ) -> Result<(ConversationState, ContextOptimization)> {
        let now = Utc::now();
        let existing = self.store.get_conversation(&turn.conversation_id).await?;

        let mut state = match existing {
            Some(previous) => {
                let counters = previous.context_metadata.as_ref();
                ConversationState {
                    user_id: turn.user_id.clone().or(previous.user_id),
                    context_metadata: Some(ContextMetadata {
                        turn_count: counters.map_or(0, |m| m.turn_count) + 1,
                        last_activity: now,
                        total_tokens: counters.map_or(0, |m| m.total_tokens) + turn.turn_tokens,
                        relevance_score: None,
                    }),
                    created_at: previous.created_at.or(Some(now)),
                    version: Some(previous.version.unwrap_or(0) + 1),
                    ..ConversationState::new(turn.conversation_id.clone())
                }
            }
            None => ConversationState {
                user_id: turn.user_id.clone(),
                context_metadata: Some(ContextMetadata {
                    turn_count: 1,
                    last_activity: now,
                    total_tokens: turn.turn_tokens,
                    relevance_score: None,
                }),
                created_at: Some(now),
                version: Some(1),
                ..ConversationState::new(turn.conversation_id.clone())
            },
        };
        state.previous_response_id = Some(turn.response_id);
        state.updated_at = Some(now);

        let (turn_count, total_tokens) = state
            .context_metadata
            .as_ref()
            .map_or((0, 0), |m| (m.turn_count, m.total_tokens));
        let optimization = self.context.optimize_context(&ContextOptimizationRequest {
            conversation_id: Some(turn.conversation_id.clone()),
            turn_count,
            total_tokens,
            max_tokens: turn.max_tokens,
        });
        if let Some(metadata) = state.context_metadata.as_mut() {
            metadata.relevance_score = Some(optimization.relevance_score);
        }

        self.store
            .save_conversation(&turn.conversation_id, state.clone())
            .await?;
        tracing::info!(
            conversation_id = %state.conversation_id,
            version = state.version.unwrap_or(0),
            turn_count,
            total_tokens,
            "Recorded conversation turn"
        );

        Ok((state, optimization))
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<()> {
        self.store.delete_conversation(conversation_id).await?;
        tracing::info!(conversation_id, "Deleted conversation");
        Ok(())
    }

    pub async fn cleanup(&self, older_than_hours: u64) -> Result<usize> {
        let removed = self
            .store
            .cleanup_expired_conversations(older_than_hours)
            .await?;
        tracing::info!(removed, older_than_hours, "Cleaned up expired conversations");
        Ok(removed)
    }
}
