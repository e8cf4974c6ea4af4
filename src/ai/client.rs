use super::openai::OpenAiResponsesTransport;
use super::parsers::{parse_file_search_citations, parse_web_search};
use super::request::build_request;
use super::retry::{
    retry_with_backoff, CallTracer, JitterSource, RandJitter, RetryPolicy, Sleeper, SpanTracer,
    TokioSleeper,
};
use super::streaming::ResponseChunk;
use super::ResponsesTransport;
use crate::config::Config;
use crate::models::{ConversationState, Metadata, ResponseRequest, ResponseResult};
use crate::redact::{KeyPatternRedactor, Redactor};
use crate::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;

const CREATE_OPERATION: &str = "responses.create";

/// Responses API client: builds the payload, calls the provider with retry,
/// and normalizes the raw response.
pub struct ResponsesClient {
    transport: Option<Arc<dyn ResponsesTransport>>,
    web_search_enabled: bool,
    redactor: Arc<dyn Redactor>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn JitterSource>,
    tracer: Option<Arc<dyn CallTracer>>,
}

impl ResponsesClient {
    /// A client without a transport fails every call with a configuration error.
    pub fn new(transport: Option<Arc<dyn ResponsesTransport>>) -> Self {
        Self {
            transport,
            web_search_enabled: false,
            redactor: Arc::new(KeyPatternRedactor::default()),
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(RandJitter),
            tracer: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Option<Arc<dyn ResponsesTransport>> = match &config.openai_api_key {
            Some(api_key) => Some(Arc::new(
                OpenAiResponsesTransport::new(api_key.clone(), config.request_timeout)?
                    .with_base_url(config.openai_base_url.clone()),
            )),
            None => {
                tracing::warn!("OPENAI_API_KEY not set; provider calls will fail");
                None
            }
        };

        Ok(Self::new(transport)
            .with_web_search(config.web_search_enabled)
            .with_tracer(Arc::new(SpanTracer)))
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search_enabled = enabled;
        self
    }

    pub fn with_redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn CallTracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn web_search_enabled(&self) -> bool {
        self.web_search_enabled
    }

    pub async fn create_response(&self, request: &ResponseRequest) -> Result<ResponseResult> {
        let transport = self.transport.as_ref().ok_or_else(|| {
            Error::Config("No OpenAI API key or transport configured".to_string())
        })?;

        let payload = serde_json::to_value(build_request(
            request,
            self.web_search_enabled,
            self.redactor.as_ref(),
        ))?;
        let payload = &payload;

        let raw = retry_with_backoff(
            &self.policy,
            self.sleeper.as_ref(),
            self.jitter.as_ref(),
            |attempt| async move {
                tracing::debug!("Provider attempt {}/{}", attempt, self.policy.max_attempts);
                let call = transport.create_response(payload);
                match &self.tracer {
                    Some(tracer) => tracer.trace(CREATE_OPERATION, call).await,
                    None => call.await,
                }
            },
        )
        .await?;

        self.assemble(&raw)
    }

    /// Streaming is not wired to the provider yet; the stream ends immediately.
    pub fn stream_response(&self, request: &ResponseRequest) -> BoxStream<'static, Result<ResponseChunk>> {
        tracing::debug!(model = %request.model, "Streaming requested; returning empty stream");
        stream::empty().boxed()
    }

    fn assemble(&self, raw: &Value) -> Result<ResponseResult> {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::provider(None, "Response is missing an id"))?
            .to_string();

        let mut parsed = parse_file_search_citations(raw);
        if self.web_search_enabled {
            let web = parse_web_search(raw);
            parsed.annotations.extend(web.annotations);
            parsed.tool_results.extend(web.tool_results);
        }

        let annotations = parsed
            .annotations
            .into_iter()
            .map(|mut annotation| {
                annotation.data = self.redactor.redact(&annotation.data);
                annotation
            })
            .collect();

        let metadata: Metadata = raw
            .get("metadata")
            .map(|m| self.redactor.redact(m))
            .and_then(|m| m.as_object().cloned())
            .unwrap_or_default();

        let mut conversation_state = ConversationState::new(id.clone());
        conversation_state.previous_response_id = Some(id.clone());

        tracing::debug!(response_id = %id, "Assembled response result");

        Ok(ResponseResult {
            output_text: output_text(raw),
            annotations,
            tool_results: parsed.tool_results,
            metadata,
            conversation_state,
            id,
        })
    }
}

/// Concatenate every `output_text` segment in provider order, including the
/// ones nested in `message` items.
fn output_text(raw: &Value) -> String {
    let Some(output) = raw.get("output").and_then(Value::as_array) else {
        return String::new();
    };

    let mut text = String::new();
    for item in output {
        match item.get("type").and_then(Value::as_str) {
            Some("output_text") => push_text(&mut text, item),
            Some("message") => {
                for part in item
                    .get("content")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                {
                    if part.get("type").and_then(Value::as_str) == Some("output_text") {
                        push_text(&mut text, part);
                    }
                }
            }
            _ => {}
        }
    }
    text
}

fn push_text(text: &mut String, segment: &Value) {
    if let Some(s) = segment.get("text").and_then(Value::as_str) {
        text.push_str(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::{FixedJitter, MockResponsesTransport, RecordingSleeper, RecordingTracer};
    use crate::models::{AnnotationKind, Tool};
    use crate::redact::REDACTED;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn make_client(transport: &MockResponsesTransport, sleeper: &RecordingSleeper) -> ResponsesClient {
        ResponsesClient::new(Some(Arc::new(transport.clone())))
            .with_sleeper(Arc::new(sleeper.clone()))
            .with_jitter(Arc::new(FixedJitter(0.8)))
    }

    fn raw_response() -> Value {
        json!({
            "id": "resp_42",
            "output": [
                {"type": "output_text", "text": "Hello, "},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "world"},
                    {"type": "refusal", "text": "ignored"}
                ]},
                {"type": "annotation", "annotation": {
                    "source": "file_search", "document_id": "doc-1", "text": "p", "token": "abc"
                }},
                {"type": "annotation", "annotation": {
                    "source": "web_search", "url": "https://example.com"
                }},
                {"type": "tool_result", "tool_name": "web_search", "results": []},
                {"type": "output_text", "text": "!"}
            ],
            "metadata": {"trace": "t1", "secret": "s"}
        })
    }

    #[tokio::test]
    async fn test_missing_transport_is_config_error() {
        let client = ResponsesClient::new(None);
        let err = client
            .create_response(&ResponseRequest::new("gpt-4o", "Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_result_assembly() {
        let transport = MockResponsesTransport::new().with_response(raw_response());
        let sleeper = RecordingSleeper::new();
        let client = make_client(&transport, &sleeper);

        let result = client
            .create_response(&ResponseRequest::new("gpt-4o", "Hi"))
            .await
            .unwrap();

        assert_eq!(result.id, "resp_42");
        assert_eq!(result.output_text, "Hello, world!");
        assert_eq!(result.conversation_state.conversation_id, "resp_42");
        assert_eq!(
            result.conversation_state.previous_response_id.as_deref(),
            Some("resp_42")
        );
        assert_eq!(result.metadata["trace"], "t1");
        assert_eq!(result.metadata["secret"], REDACTED);

        // Web search disabled: only the file search citation survives.
        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.annotations[0].kind, AnnotationKind::Citation);
        assert!(result.tool_results.is_empty());
    }

    #[tokio::test]
    async fn test_web_search_results_appended_when_enabled() {
        let transport = MockResponsesTransport::new().with_response(raw_response());
        let sleeper = RecordingSleeper::new();
        let client = make_client(&transport, &sleeper).with_web_search(true);

        let result = client
            .create_response(&ResponseRequest::new("gpt-4o", "Hi"))
            .await
            .unwrap();

        let kinds: Vec<AnnotationKind> = result.annotations.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AnnotationKind::Citation, AnnotationKind::WebSource]);
        assert_eq!(result.tool_results.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_after_five_attempts() {
        let transport = MockResponsesTransport::new().with_failure(Some(500), "internal error");
        let sleeper = RecordingSleeper::new();
        let client = make_client(&transport, &sleeper);

        let err = client
            .create_response(&ResponseRequest::new("gpt-4o", "Hi"))
            .await
            .unwrap_err();

        assert_eq!(transport.get_call_count(), 5);
        assert_eq!(err.status(), Some(500));
        assert_eq!(sleeper.recorded_millis(), vec![280, 480, 880, 1680]);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let transport = MockResponsesTransport::new()
            .with_failure(Some(429), "rate limited")
            .with_failure(None, "ECONNRESET")
            .with_failure(Some(503), "unavailable")
            .with_response(json!({"id": "resp_ok", "output": []}));
        let sleeper = RecordingSleeper::new();
        let client = make_client(&transport, &sleeper);

        let result = client
            .create_response(&ResponseRequest::new("gpt-4o", "Hi"))
            .await
            .unwrap();

        assert_eq!(result.id, "resp_ok");
        assert_eq!(result.output_text, "");
        assert_eq!(sleeper.recorded_millis(), vec![280, 480, 880]);
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates_immediately() {
        let transport = MockResponsesTransport::new().with_failure(Some(401), "invalid api key");
        let sleeper = RecordingSleeper::new();
        let client = make_client(&transport, &sleeper);

        let err = client
            .create_response(&ResponseRequest::new("gpt-4o", "Hi"))
            .await
            .unwrap_err();

        assert_eq!(transport.get_call_count(), 1);
        assert_eq!(err.status(), Some(401));
        assert!(sleeper.recorded_millis().is_empty());
    }

    #[tokio::test]
    async fn test_tracer_wraps_every_attempt() {
        let transport = MockResponsesTransport::new()
            .with_failure(Some(500), "boom")
            .with_response(json!({"id": "resp_1", "output": []}));
        let sleeper = RecordingSleeper::new();
        let tracer = RecordingTracer::new();
        let client = make_client(&transport, &sleeper).with_tracer(Arc::new(tracer.clone()));

        client
            .create_response(&ResponseRequest::new("gpt-4o", "Hi"))
            .await
            .unwrap();

        assert_eq!(tracer.operations(), vec![CREATE_OPERATION, CREATE_OPERATION]);
    }

    #[tokio::test]
    async fn test_payload_respects_web_search_flag() {
        let transport = MockResponsesTransport::new();
        let sleeper = RecordingSleeper::new();
        let client = make_client(&transport, &sleeper);

        let mut request = ResponseRequest::new("gpt-4o", "Hi");
        request.tools = vec![Tool::WebSearch { config: None }];
        client.create_response(&request).await.unwrap();

        assert!(transport.payloads()[0].get("tools").is_none());
    }

    #[tokio::test]
    async fn test_missing_id_is_provider_error() {
        let transport = MockResponsesTransport::new().with_response(json!({"output": []}));
        let sleeper = RecordingSleeper::new();
        let client = make_client(&transport, &sleeper);

        let err = client
            .create_response(&ResponseRequest::new("gpt-4o", "Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { status: None, .. }));
    }

    #[tokio::test]
    async fn test_stream_response_is_empty() {
        let client = ResponsesClient::new(None);
        let chunks: Vec<_> = client
            .stream_response(&ResponseRequest::new("gpt-4o", "Hi"))
            .collect()
            .await;
        assert!(chunks.is_empty());
    }
}
