//! Streaming event types.

use crate::models::Annotation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-sent event emitted by the provider while a response streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone,
    #[serde(rename = "response.tool_call")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        arguments: Value,
    },
    #[serde(rename = "response.annotation")]
    Annotation { annotation: Annotation },
}

/// Chunk handed to callers of a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseChunk {
    Text {
        text: String,
    },
    ToolInvocation {
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },
    Annotation {
        annotation: Annotation,
    },
}

impl StreamEvent {
    /// The chunk this event produces. The done marker produces none.
    pub fn into_chunk(self) -> Option<ResponseChunk> {
        match self {
            StreamEvent::OutputTextDelta { delta } => Some(ResponseChunk::Text { text: delta }),
            StreamEvent::OutputTextDone => None,
            StreamEvent::ToolCall {
                tool_call_id,
                tool_name,
                arguments,
            } => Some(ResponseChunk::ToolInvocation {
                tool_call_id,
                tool_name,
                arguments,
            }),
            StreamEvent::Annotation { annotation } => Some(ResponseChunk::Annotation { annotation }),
        }
    }
}
