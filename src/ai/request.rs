//! Request building: caller-facing [`ResponseRequest`] to provider payload.

use super::openai::types::{InputItem, ResponsesPayload, ToolDeclaration};
use crate::models::{MultimodalInput, RequestInput, ResponseRequest, Role, Tool};
use crate::redact::Redactor;
use base64::Engine as _;
use serde_json::Value;

/// Build the provider payload for `request`.
///
/// `web_search` tools are dropped unless `web_search_enabled` is set, and the
/// request metadata is redacted before it leaves the process.
pub fn build_request(
    request: &ResponseRequest,
    web_search_enabled: bool,
    redactor: &dyn Redactor,
) -> ResponsesPayload {
    let input = match &request.input {
        RequestInput::Text(text) => vec![InputItem::Message {
            role: "user".to_string(),
            text: text.clone(),
            metadata: None,
        }],
        RequestInput::Items(items) => items.iter().map(input_item).collect(),
    };

    let tools: Vec<ToolDeclaration> = request
        .tools
        .iter()
        .filter_map(|tool| tool_declaration(tool, web_search_enabled))
        .collect();

    let metadata = request
        .metadata
        .as_ref()
        .map(|metadata| redactor.redact(&Value::Object(metadata.clone())));

    tracing::debug!(
        model = %request.model,
        inputs = input.len(),
        tools = tools.len(),
        chained = request.previous_response_id.is_some(),
        "Built responses payload"
    );

    ResponsesPayload {
        model: request.model.clone(),
        input,
        metadata,
        store: request.store,
        previous_response_id: request.previous_response_id.clone(),
        tools,
    }
}

fn input_item(item: &MultimodalInput) -> InputItem {
    let engine = &base64::engine::general_purpose::STANDARD;
    match item {
        MultimodalInput::Text {
            content,
            role,
            metadata,
        } => InputItem::Message {
            role: message_role(*role).to_string(),
            text: content.clone(),
            metadata: metadata.clone(),
        },
        MultimodalInput::Image { content, metadata } => InputItem::InputImage {
            image: engine.encode(content),
            metadata: metadata.clone(),
        },
        MultimodalInput::Audio { content, metadata } => InputItem::InputAudio {
            audio: engine.encode(content),
            metadata: metadata.clone(),
        },
    }
}

/// The Responses API has no `tool` message role, so tool output is replayed as user text.
fn message_role(role: Option<Role>) -> Role {
    match role {
        Some(Role::System) => Role::System,
        Some(Role::Assistant) => Role::Assistant,
        Some(Role::User) | Some(Role::Tool) | None => Role::User,
    }
}

fn tool_declaration(tool: &Tool, web_search_enabled: bool) -> Option<ToolDeclaration> {
    match tool {
        Tool::FileSearch { config } => Some(ToolDeclaration::FileSearch {
            config: config.clone(),
        }),
        Tool::WebSearch { config } if web_search_enabled => Some(ToolDeclaration::WebSearch {
            config: config
                .as_ref()
                .filter(|c| c.as_object().is_some_and(|o| !o.is_empty()))
                .cloned(),
        }),
        Tool::WebSearch { .. } => None,
        Tool::Function {
            name,
            description,
            parameters,
        } => Some(ToolDeclaration::Function {
            name: name.clone(),
            description: description.clone(),
            parameters: parameters.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use crate::redact::{KeyPatternRedactor, REDACTED};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn metadata(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn to_json(request: &ResponseRequest, web_search: bool) -> Value {
        let payload = build_request(request, web_search, &KeyPatternRedactor::default());
        serde_json::to_value(payload).unwrap()
    }

    #[test]
    fn test_basic_text_request() {
        let mut request = ResponseRequest::new("gpt-4", "Hello world");
        request.metadata = Some(metadata(json!({"userId": "user123"})));
        request.store = true;
        request.previous_response_id = Some("prev-123".to_string());

        assert_eq!(
            to_json(&request, false),
            json!({
                "model": "gpt-4",
                "input": [{"type": "message", "text": "Hello world", "role": "user"}],
                "metadata": {"userId": "user123"},
                "store": true,
                "previous_response_id": "prev-123"
            })
        );
    }

    #[test]
    fn test_no_tools_omits_tools_key() {
        let json = to_json(&ResponseRequest::new("gpt-4", "Hello"), true);
        assert!(json.get("tools").is_none());
        assert_eq!(json["store"], false);
    }

    #[test]
    fn test_metadata_is_redacted() {
        let mut request = ResponseRequest::new("gpt-4", "Hello");
        request.metadata = Some(metadata(json!({"userId": "u1", "apiKey": "sk-live"})));

        let json = to_json(&request, false);
        assert_eq!(json["metadata"], json!({"userId": "u1", "apiKey": REDACTED}));
    }

    #[test]
    fn test_multimodal_items_are_mapped_in_order() {
        let request = ResponseRequest::new(
            "gpt-4o",
            vec![
                MultimodalInput::text("describe").with_metadata(metadata(json!({"lang": "en"}))),
                MultimodalInput::image(vec![1, 2, 3]),
                MultimodalInput::audio(vec![0xFF]),
            ],
        );

        assert_eq!(
            to_json(&request, false)["input"],
            json!([
                {"type": "message", "role": "user", "text": "describe", "metadata": {"lang": "en"}},
                {"type": "input_image", "image": "AQID"},
                {"type": "input_audio", "audio": "/w=="}
            ])
        );
    }

    #[test]
    fn test_text_items_keep_their_role() {
        let request = ResponseRequest::new(
            "gpt-4o",
            vec![
                MultimodalInput::message(Role::System, "Be brief."),
                MultimodalInput::message(Role::Assistant, "Earlier answer"),
                MultimodalInput::message(Role::Tool, "search output"),
                MultimodalInput::text("Next question"),
            ],
        );

        let input = &to_json(&request, false)["input"];
        assert_eq!(input[0]["role"], "system");
        assert_eq!(input[1]["role"], "assistant");
        assert_eq!(input[2]["role"], "user");
        assert_eq!(input[3]["role"], "user");
    }

    #[test]
    fn test_web_search_dropped_when_flag_disabled() {
        let mut request = ResponseRequest::new("gpt-4", "Hello");
        request.tools = vec![
            Tool::FileSearch {
                config: Some(json!({"vector_store_ids": ["vs_1"]})),
            },
            Tool::WebSearch { config: None },
        ];

        assert_eq!(
            to_json(&request, false)["tools"],
            json!([{"type": "file_search", "config": {"vector_store_ids": ["vs_1"]}}])
        );
    }

    #[test]
    fn test_web_search_config_only_when_non_empty_object() {
        let mut request = ResponseRequest::new("gpt-4", "Hello");
        request.tools = vec![
            Tool::WebSearch {
                config: Some(json!({})),
            },
            Tool::WebSearch {
                config: Some(json!("not an object")),
            },
            Tool::WebSearch {
                config: Some(json!({"search_context_size": "low"})),
            },
        ];

        assert_eq!(
            to_json(&request, true)["tools"],
            json!([
                {"type": "web_search"},
                {"type": "web_search"},
                {"type": "web_search", "config": {"search_context_size": "low"}}
            ])
        );
    }

    #[test]
    fn test_only_disabled_web_search_omits_tools_key() {
        let mut request = ResponseRequest::new("gpt-4", "Hello");
        request.tools = vec![Tool::WebSearch { config: None }];
        assert!(to_json(&request, false).get("tools").is_none());
    }
}
