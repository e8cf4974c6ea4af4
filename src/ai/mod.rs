//! Model provider integration for the Responses API
//!
//! Builds provider payloads, executes them with retry, and normalizes the raw
//! response into text, annotations, tool results and continuation state.

pub mod client;
pub mod mock;
pub mod openai;
pub mod parsers;
pub mod request;
pub mod retry;
pub mod streaming;

pub use client::ResponsesClient;
pub use mock::{FixedJitter, MockResponsesTransport, RecordingSleeper, RecordingTracer};
pub use openai::OpenAiResponsesTransport;
pub use parsers::{parse_file_search_citations, parse_web_search, ParsedToolOutput};
pub use request::build_request;
pub use retry::{CallTracer, JitterSource, RetryPolicy, Sleeper};
pub use streaming::{ResponseChunk, StreamEvent};

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Provider call boundary: one JSON payload out, one raw JSON response back.
#[async_trait]
pub trait ResponsesTransport: Send + Sync {
    async fn create_response(&self, payload: &Value) -> Result<Value>;
}
