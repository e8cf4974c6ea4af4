//! Conversation orchestration over the OpenAI Responses API
//!
//! Builds multimodal provider requests, retries transient failures, normalizes
//! citations and tool results, keeps per-conversation continuation state, and
//! fits message history and prompts into a token budget.

pub mod ai;
pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod redact;
pub mod splitter;
pub mod state;
pub mod tokens;

pub use error::{Error, Result};
