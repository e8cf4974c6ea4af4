//! Turn orchestration: history budgeting, the provider call, and state updates.

use crate::ai::ResponsesClient;
use crate::config::Config;
use crate::context::{ContextOptimization, ConversationContextManager};
use crate::models::{
    Metadata, ModelMessage, MultimodalInput, RequestInput, ResponseRequest, ResponseResult, Tool,
};
use crate::state::{ConversationStateManager, ConversationStore, JsonFileConversationStore, TurnRecord};
use crate::tokens::TokenBudget;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Runs conversation turns against the provider and keeps their state.
pub struct Orchestrator {
    client: ResponsesClient,
    state: ConversationStateManager,
    budget: TokenBudget,
    model: String,
    max_context_tokens: u64,
}

/// Injectable service bundle used to construct [`Orchestrator`] in tests/harnesses.
pub struct OrchestratorServices {
    pub client: ResponsesClient,
    pub store: Arc<dyn ConversationStore>,
    pub budget: TokenBudget,
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// A new conversation id is generated when absent.
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
    pub input: RequestInput,
    pub tools: Vec<Tool>,
    /// Prior messages, only sent when there is no stored continuation.
    pub history: Vec<ModelMessage>,
    pub metadata: Option<Metadata>,
    pub store: bool,
}

impl TurnRequest {
    pub fn new(input: impl Into<RequestInput>) -> Self {
        Self {
            conversation_id: None,
            user_id: None,
            input: input.into(),
            tools: Vec::new(),
            history: Vec::new(),
            metadata: None,
            store: false,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Provider result whose `conversation_state` is the persisted state.
    pub result: ResponseResult,
    pub optimization: ContextOptimization,
    /// History actually sent, after truncation. Empty when chained.
    pub history_sent: Vec<ModelMessage>,
}

impl Orchestrator {
    pub fn with_services(services: OrchestratorServices, model: String, max_context_tokens: u64) -> Self {
        Self {
            client: services.client,
            state: ConversationStateManager::new(
                services.store,
                ConversationContextManager::new(max_context_tokens),
            ),
            budget: services.budget,
            model,
            max_context_tokens,
        }
    }

    /// Construct from environment configuration with the JSON file store.
    pub fn from_config(config: &Config) -> Result<Self> {
        info!(
            "Provider model: {} (web search {})",
            config.model,
            if config.web_search_enabled { "on" } else { "off" }
        );
        let services = OrchestratorServices {
            client: ResponsesClient::from_config(config)?,
            store: Arc::new(JsonFileConversationStore::new(config.state_path.clone())),
            budget: TokenBudget::for_model(&config.model, config.context_size)?,
        };
        Ok(Self::with_services(
            services,
            config.model.clone(),
            config.max_context_tokens,
        ))
    }

    pub fn state(&self) -> &ConversationStateManager {
        &self.state
    }

    pub async fn submit_turn(&self, turn: TurnRequest) -> Result<TurnOutcome> {
        let conversation_id = match &turn.conversation_id {
            Some(id) if id.trim().is_empty() => {
                return Err(Error::InvalidInput(
                    "conversation id must not be blank".to_string(),
                ))
            }
            Some(id) => id.clone(),
            None => Uuid::new_v4().to_string(),
        };
        let previous_response_id = self
            .state
            .load(&conversation_id)
            .await?
            .and_then(|state| state.previous_response_id);

        let history_sent = match previous_response_id {
            Some(_) => Vec::new(),
            None => self.budget.truncate_messages(
                &turn.history,
                usize::try_from(self.max_context_tokens).unwrap_or(usize::MAX),
                true,
            ),
        };
        info!(
            "Submitting turn for conversation {} (chained: {}, history: {}/{})",
            conversation_id,
            previous_response_id.is_some(),
            history_sent.len(),
            turn.history.len()
        );

        let request = ResponseRequest {
            model: self.model.clone(),
            input: with_history(&history_sent, turn.input.clone()),
            tools: turn.tools,
            previous_response_id,
            store: turn.store,
            metadata: turn.metadata,
            streaming_options: None,
        };
        let mut result = self.client.create_response(&request).await?;

        let exchange = [
            ModelMessage::user(input_text(&turn.input)),
            ModelMessage::assistant(result.output_text.clone()),
        ];
        let turn_tokens = self.budget.count_messages(&exchange) as u64;

        let (state, optimization) = self
            .state
            .record_turn(TurnRecord {
                conversation_id,
                user_id: turn.user_id,
                response_id: result.id.clone(),
                turn_tokens,
                max_tokens: Some(self.max_context_tokens),
            })
            .await?;
        result.conversation_state = state;

        Ok(TurnOutcome {
            result,
            optimization,
            history_sent,
        })
    }
}

/// Prepend history as text items spoken by their original role.
fn with_history(history: &[ModelMessage], input: RequestInput) -> RequestInput {
    if history.is_empty() {
        return input;
    }

    let mut items: Vec<MultimodalInput> = history
        .iter()
        .map(|message| MultimodalInput::message(message.role, message.text()))
        .collect();
    match input {
        RequestInput::Text(text) => items.push(MultimodalInput::text(text)),
        RequestInput::Items(rest) => items.extend(rest),
    }
    RequestInput::Items(items)
}

fn input_text(input: &RequestInput) -> String {
    match input {
        RequestInput::Text(text) => text.clone(),
        RequestInput::Items(items) => items
            .iter()
            .filter_map(|item| match item {
                MultimodalInput::Text { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
