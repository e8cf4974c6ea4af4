//! Token budget utilities
//!
//! Estimates the token cost of message sequences and trims prompts or message
//! histories until they fit a budget. None of these operations fail: empty or
//! oversized input degrades to empty or truncated output.

use crate::models::{MessageContent, ModelMessage, Part, Role, ToolOutput};
use crate::splitter::RecursiveCharacterTextSplitter;
use crate::{Error, Result};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Smallest prompt prefix `trim_prompt` will hand back, in characters.
pub const MIN_CHUNK_SIZE: usize = 140;
pub const DEFAULT_CONTEXT_SIZE: usize = 128_000;

const MESSAGE_OVERHEAD_TOKENS: usize = 5;
/// Flat charge for parts that are not text (images, files, JSON tool output).
const NON_TEXT_PART_TOKENS: usize = 765;
const TRIM_CHARS_PER_TOKEN: usize = 3;
const TRUNCATE_CHARS_PER_TOKEN: usize = 4;

pub trait TokenEncoder: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// BPE encoder backed by the OpenAI encodings shipped with `tiktoken-rs`.
#[derive(Clone)]
pub struct TiktokenEncoder {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEncoder {
    /// `o200k_base`, used by the gpt-4o and o-series models.
    pub fn o200k() -> Result<Self> {
        let bpe = tiktoken_rs::o200k_base()
            .map_err(|e| Error::Config(format!("Failed to load o200k_base encoding: {}", e)))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    /// Encoding for `model`, or `o200k_base` when tiktoken does not know it.
    pub fn for_model(model: &str) -> Result<Self> {
        match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Ok(Self { bpe: Arc::new(bpe) }),
            Err(e) => {
                tracing::debug!("No tokenizer mapping for {} ({}); using o200k_base", model, e);
                Self::o200k()
            }
        }
    }
}

impl TokenEncoder for TiktokenEncoder {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Character-ratio estimate: `ceil(chars / chars_per_token)`. Deterministic,
/// so tests can reason about exact budgets.
#[derive(Debug, Clone)]
pub struct CharRatioEncoder {
    chars_per_token: usize,
}

impl CharRatioEncoder {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEncoder {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEncoder for CharRatioEncoder {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

#[derive(Clone)]
pub struct TokenBudget {
    encoder: Arc<dyn TokenEncoder>,
    context_size: usize,
}

impl TokenBudget {
    pub fn new(encoder: Arc<dyn TokenEncoder>, context_size: usize) -> Self {
        Self {
            encoder,
            context_size,
        }
    }

    /// Budget counted with the encoding of `model`.
    pub fn for_model(model: &str, context_size: usize) -> Result<Self> {
        Ok(Self::new(
            Arc::new(TiktokenEncoder::for_model(model)?),
            context_size,
        ))
    }

    /// `o200k_base` budget over [`DEFAULT_CONTEXT_SIZE`] tokens.
    pub fn o200k() -> Result<Self> {
        Ok(Self::new(Arc::new(TiktokenEncoder::o200k()?), DEFAULT_CONTEXT_SIZE))
    }

    pub fn context_size(&self) -> usize {
        self.context_size
    }

    pub fn count_text(&self, text: &str) -> usize {
        self.encoder.count(text)
    }

    pub fn count_message(&self, message: &ModelMessage) -> usize {
        let role = self.count_text(&message.role.to_string());
        let content = match &message.content {
            MessageContent::Text(text) => self.count_text(text),
            MessageContent::Parts(parts) => parts.iter().map(|part| self.count_part(part)).sum(),
        };
        role + content + MESSAGE_OVERHEAD_TOKENS
    }

    fn count_part(&self, part: &Part) -> usize {
        match part {
            Part::Text { text } => self.count_text(text),
            Part::ToolResult {
                output: ToolOutput::Text { value },
                ..
            } => self.count_text(value),
            _ => NON_TEXT_PART_TOKENS,
        }
    }

    pub fn count_messages(&self, messages: &[ModelMessage]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }

    /// Trim `prompt` to the configured context size.
    pub fn trim_prompt(&self, prompt: &str) -> String {
        self.trim_prompt_to(prompt, self.context_size)
    }

    /// Trim `prompt` until it encodes to at most `context_size` tokens.
    ///
    /// The result is never shorter than `min(MIN_CHUNK_SIZE, len(prompt))`
    /// characters, so extreme overflow can leave it above budget.
    pub fn trim_prompt_to(&self, prompt: &str, context_size: usize) -> String {
        if prompt.is_empty() {
            return String::new();
        }

        let length = self.count_text(prompt);
        if length <= context_size {
            return prompt.to_string();
        }

        let prompt_len = prompt.chars().count();
        let overflow = length - context_size;
        let chunk_size = prompt_len.saturating_sub(overflow * TRIM_CHARS_PER_TOKEN);
        if chunk_size < MIN_CHUNK_SIZE {
            return take_chars(prompt, MIN_CHUNK_SIZE);
        }

        let first_chunk = RecursiveCharacterTextSplitter::new(chunk_size, 0)
            .and_then(|splitter| splitter.split_text(prompt))
            .ok()
            .and_then(|chunks| chunks.into_iter().next())
            .unwrap_or_default();
        let trimmed_len = first_chunk.chars().count();

        if trimmed_len >= prompt_len {
            // The splitter made no progress; cut hard so the recursion shrinks.
            return self.trim_prompt_to(&take_chars(prompt, chunk_size), context_size);
        }
        if trimmed_len < MIN_CHUNK_SIZE.min(prompt_len) {
            return take_chars(prompt, MIN_CHUNK_SIZE);
        }

        self.trim_prompt_to(&first_chunk, context_size)
    }

    /// Drop the oldest messages until the history fits in `max_tokens`.
    ///
    /// A leading system message is kept first when `preserve_system_message`
    /// is set, trimmed if it alone exceeds the budget. When a single message
    /// remains and still does not fit, its content is shrunk instead.
    pub fn truncate_messages(
        &self,
        messages: &[ModelMessage],
        max_tokens: usize,
        preserve_system_message: bool,
    ) -> Vec<ModelMessage> {
        let (system, rest) = match messages.split_first() {
            Some((first, rest)) if preserve_system_message && first.role == Role::System => {
                (Some(first.clone()), rest)
            }
            _ => (None, messages),
        };

        let mut available = max_tokens;
        let mut result = Vec::with_capacity(messages.len());

        if let Some(mut system) = system {
            let system_tokens = self.count_message(&system);
            if system_tokens > max_tokens {
                if let MessageContent::Text(text) = &system.content {
                    system.content = MessageContent::Text(self.trim_prompt_to(text, max_tokens));
                }
                available = 0;
            } else {
                available = max_tokens - system_tokens;
            }
            result.push(system);
        }

        let mut start = 0;
        while rest.len() - start > 1 && self.count_messages(&rest[start..]) > available {
            start += 1;
        }

        let remaining = &rest[start..];
        if self.count_messages(remaining) <= available {
            result.extend(remaining.iter().cloned());
        } else if let Some(last) = remaining.last() {
            if let Some(shrunk) = self.shrink_message(last, available) {
                result.push(shrunk);
            }
        }

        tracing::debug!(
            input = messages.len(),
            output = result.len(),
            max_tokens,
            "Truncated message history"
        );

        result
    }

    fn shrink_message(&self, message: &ModelMessage, available: usize) -> Option<ModelMessage> {
        let overhead = self.count_text(&message.role.to_string()) + MESSAGE_OVERHEAD_TOKENS;
        if available <= overhead {
            return None;
        }
        let content_budget = available - overhead;
        let excess = self.count_message(message).saturating_sub(available);

        let content = match (&message.role, &message.content) {
            (Role::Tool, MessageContent::Parts(parts)) => {
                MessageContent::Parts(self.shrink_tool_parts(parts, excess))
            }
            (role, MessageContent::Text(text)) if *role != Role::Tool => {
                let keep = text
                    .chars()
                    .count()
                    .saturating_sub(excess * TRUNCATE_CHARS_PER_TOKEN);
                let cut = take_chars(text, keep);
                MessageContent::Text(self.trim_prompt_to(&cut, content_budget))
            }
            (_, content) => content.clone(),
        };

        Some(ModelMessage {
            role: message.role,
            content,
        })
    }

    /// Walk parts from the end, shrinking or removing text tool results
    /// until `excess` tokens are gone.
    fn shrink_tool_parts(&self, parts: &[Part], mut excess: usize) -> Vec<Part> {
        let mut parts = parts.to_vec();
        let mut index = parts.len();

        while excess > 0 && index > 0 {
            index -= 1;
            let Part::ToolResult {
                output: ToolOutput::Text { value },
                ..
            } = &mut parts[index]
            else {
                continue;
            };

            let tokens = self.count_text(value);
            if tokens <= excess {
                excess -= tokens;
                parts.remove(index);
            } else {
                *value = self.trim_prompt_to(value, tokens - excess);
                excess = 0;
            }
        }

        parts
    }
}

fn take_chars(text: &str, count: usize) -> String {
    text.chars().take(count).collect()
}
