//! Data models and structures
//!
//! Defines the multimodal request/response types exchanged with callers, the
//! persisted conversation state, and the message shapes used for token budgeting.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Flat key -> scalar map attached to requests and input items.
pub type Metadata = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MultimodalInput {
    Text {
        content: String,
        /// Speaker of the text; the provider treats a missing role as `user`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
    Image {
        content: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
    Audio {
        content: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
    },
}

impl MultimodalInput {
    pub fn text(content: impl Into<String>) -> Self {
        MultimodalInput::Text {
            content: content.into(),
            role: None,
            metadata: None,
        }
    }

    /// Text spoken by `role`, used to replay history inline.
    pub fn message(role: Role, content: impl Into<String>) -> Self {
        MultimodalInput::Text {
            content: content.into(),
            role: Some(role),
            metadata: None,
        }
    }

    pub fn image(content: Vec<u8>) -> Self {
        MultimodalInput::Image {
            content,
            metadata: None,
        }
    }

    pub fn audio(content: Vec<u8>) -> Self {
        MultimodalInput::Audio {
            content,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, extra: Metadata) -> Self {
        match &mut self {
            MultimodalInput::Text { metadata, .. }
            | MultimodalInput::Image { metadata, .. }
            | MultimodalInput::Audio { metadata, .. } => *metadata = Some(extra),
        }
        self
    }

    /// Interpret a loosely-typed JSON item.
    ///
    /// `image`/`audio` items carry base64 content. Anything that does not fit
    /// one of the three shapes becomes a text item holding its stringified
    /// `content`, or an empty string when there is none.
    pub fn from_json(value: &Value) -> Self {
        let metadata = value.get("metadata").and_then(Value::as_object).cloned();
        let content = value.get("content");
        let kind = value.get("type").and_then(Value::as_str);
        let role = value
            .get("role")
            .and_then(|role| serde_json::from_value(role.clone()).ok());

        let decoded = content.and_then(Value::as_str).and_then(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .ok()
        });

        match (kind, content, decoded) {
            (Some("text"), Some(Value::String(text)), _) => MultimodalInput::Text {
                content: text.clone(),
                role,
                metadata,
            },
            (Some("image"), _, Some(bytes)) => MultimodalInput::Image {
                content: bytes,
                metadata,
            },
            (Some("audio"), _, Some(bytes)) => MultimodalInput::Audio {
                content: bytes,
                metadata,
            },
            (_, content, _) => MultimodalInput::Text {
                content: content.map(stringify).unwrap_or_default(),
                role,
                metadata,
            },
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    FileSearch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<Value>,
    },
    WebSearch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<Value>,
    },
    Function {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default)]
        parameters: Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RequestInput {
    Text(String),
    Items(Vec<MultimodalInput>),
}

impl From<&str> for RequestInput {
    fn from(text: &str) -> Self {
        RequestInput::Text(text.to_string())
    }
}

impl From<String> for RequestInput {
    fn from(text: String) -> Self {
        RequestInput::Text(text)
    }
}

impl From<Vec<MultimodalInput>> for RequestInput {
    fn from(items: Vec<MultimodalInput>) -> Self {
        RequestInput::Items(items)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamingOptions {
    #[serde(default)]
    pub include_usage: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseRequest {
    pub model: String,
    pub input: RequestInput,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub previous_response_id: Option<String>,
    /// Whether the provider keeps the response server-side. Defaults to `false`.
    #[serde(default)]
    pub store: bool,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub streaming_options: Option<StreamingOptions>,
}

impl ResponseRequest {
    pub fn new(model: impl Into<String>, input: impl Into<RequestInput>) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
            tools: Vec::new(),
            previous_response_id: None,
            store: false,
            metadata: None,
            streaming_options: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Citation,
    WebSource,
}

/// Normalized citation/source record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    FileSearch,
    WebSearch,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::FileSearch => "file_search",
            ToolKind::WebSearch => "web_search",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    #[serde(rename = "type")]
    pub kind: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseResult {
    pub id: String,
    pub output_text: String,
    pub annotations: Vec<Annotation>,
    pub tool_results: Vec<ToolResult>,
    pub metadata: Metadata,
    pub conversation_state: ConversationState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextMetadata {
    pub turn_count: u32,
    pub last_activity: DateTime<Utc>,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

/// Per-conversation continuation state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub conversation_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub previous_response_id: Option<String>,
    #[serde(default)]
    pub context_metadata: Option<ContextMetadata>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<u32>,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolOutput {
    Text { value: String },
    Json { value: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text {
        text: String,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: ToolOutput,
    },
    Image {
        image: String,
        #[serde(default)]
        media_type: Option<String>,
    },
    File {
        data: String,
        media_type: String,
    },
}

/// Message content is either a plain string or a list of parts.
///
/// Variant order matters for `#[serde(untagged)]` decoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ModelMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(parts),
        }
    }

    /// Concatenated textual content, ignoring non-text parts.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Part::Text { text } => Some(text.as_str()),
                    Part::ToolResult {
                        output: ToolOutput::Text { value },
                        ..
                    } => Some(value.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}
