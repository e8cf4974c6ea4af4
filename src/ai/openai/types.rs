//! OpenAI Responses API request payloads.

use crate::models::Metadata;
use serde::Serialize;
use serde_json::Value;

/// Request body for `POST /v1/responses`.
#[derive(Debug, Serialize, PartialEq)]
pub struct ResponsesPayload {
    pub model: String,
    pub input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    /// Omitted entirely when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
}

/// One input entry. Media content is base64 encoded.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message {
        role: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
    InputImage {
        image: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
    InputAudio {
        audio: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDeclaration {
    FileSearch {
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<Value>,
    },
    WebSearch {
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<Value>,
    },
    Function {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        parameters: Value,
    },
}
