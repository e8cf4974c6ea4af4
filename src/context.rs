//! Conversation context optimization
//!
//! Decides from turn and token counters whether a conversation's history
//! should be truncated or summarized, and scores how relevant it still is.

use crate::Result;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CONTEXT_TOKENS: u64 = 8000;
/// Assumed average size of a conversation turn.
pub const AVERAGE_TOKENS_PER_TURN: u64 = 150;

const TURN_SATURATION: f64 = 20.0;
const DENSITY_SATURATION: f64 = 200.0;
const TURN_WEIGHT: f64 = 0.6;
const DENSITY_WEIGHT: f64 = 0.4;
const NEUTRAL_RELEVANCE: f64 = 0.5;
const TRUNCATION_DIVISOR: u64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextOptimizationRequest {
    pub conversation_id: Option<String>,
    pub turn_count: u32,
    pub total_tokens: u64,
    /// Zero or `None` falls back to the manager's default budget.
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextOptimization {
    pub should_truncate: bool,
    pub relevance_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_to_remove: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TruncationOutcome {
    pub tokens_removed: u64,
    pub turns_removed: u64,
    pub summary_created: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationContextManager {
    default_max_tokens: u64,
}

impl Default for ConversationContextManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTEXT_TOKENS)
    }
}

impl ConversationContextManager {
    pub fn new(default_max_tokens: u64) -> Self {
        Self { default_max_tokens }
    }

    pub fn optimize_context(&self, request: &ContextOptimizationRequest) -> ContextOptimization {
        let max_tokens = request
            .max_tokens
            .filter(|&max| max > 0)
            .unwrap_or(self.default_max_tokens);
        let relevance_score = relevance(request.turn_count, request.total_tokens);

        if request.total_tokens <= max_tokens {
            return ContextOptimization {
                should_truncate: false,
                relevance_score,
                tokens_to_remove: None,
                recommended_summary: None,
            };
        }

        let tokens_to_remove = request.total_tokens - max_tokens;
        let turns = turns_for(tokens_to_remove);
        let total_turns = u64::from(request.turn_count).max(1);
        let share = (turns as f64 / total_turns as f64 * 100.0).round().min(100.0);

        tracing::info!(
            conversation_id = request.conversation_id.as_deref().unwrap_or("-"),
            total_tokens = request.total_tokens,
            max_tokens,
            tokens_to_remove,
            "Context exceeds budget"
        );

        ContextOptimization {
            should_truncate: true,
            relevance_score,
            tokens_to_remove: Some(tokens_to_remove),
            recommended_summary: Some(format!(
                "Summarize the oldest {} conversation turns (~{}% of {}) to free {} tokens.",
                turns, share, total_turns, tokens_to_remove
            )),
        }
    }

    /// Estimated outcome of truncating a conversation to `max_tokens`.
    ///
    /// No history is inspected: a fifth of the budget is reported as removed.
    pub async fn truncate_context(
        &self,
        conversation_id: &str,
        max_tokens: u64,
    ) -> Result<TruncationOutcome> {
        let tokens_removed = max_tokens / TRUNCATION_DIVISOR;
        let turns_removed = turns_for(tokens_removed);
        tracing::debug!(
            conversation_id,
            tokens_removed,
            turns_removed,
            "Estimated context truncation"
        );
        Ok(TruncationOutcome {
            tokens_removed,
            turns_removed,
            summary_created: turns_removed > 0,
        })
    }

    /// Neutral score until content-based scoring exists.
    pub async fn calculate_relevance_score(&self, conversation_id: &str) -> Result<f64> {
        tracing::debug!(conversation_id, "Using neutral relevance score");
        Ok(NEUTRAL_RELEVANCE)
    }

    pub async fn summarize_context(&self, conversation_id: &str, turns: u64) -> Result<String> {
        Ok(format!(
            "Summary of {} earlier conversation turns in {}.",
            turns, conversation_id
        ))
    }
}

/// Weighted blend of a turn-count factor and a token-density factor, in `[0, 1]`.
pub fn relevance(turn_count: u32, total_tokens: u64) -> f64 {
    let turns = turn_count as f64;
    let turn_factor = (turns / TURN_SATURATION).min(1.0);
    let density = total_tokens as f64 / turns.max(1.0);
    let density_factor = (density / DENSITY_SATURATION).min(1.0);
    TURN_WEIGHT * turn_factor + DENSITY_WEIGHT * density_factor
}

fn turns_for(tokens: u64) -> u64 {
    tokens.div_ceil(AVERAGE_TOKENS_PER_TURN)
}
