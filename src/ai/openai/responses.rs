//! OpenAI Responses API transport.

use super::client::OpenAiHttpClient;
use crate::ai::ResponsesTransport;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub const RESPONSES_PATH: &str = "/v1/responses";

/// [`ResponsesTransport`] backed by `POST /v1/responses`.
pub struct OpenAiResponsesTransport {
    http: OpenAiHttpClient,
}

impl OpenAiResponsesTransport {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: OpenAiHttpClient::new(api_key, timeout)?,
        })
    }

    pub fn new_with_client(api_key: String, client: reqwest::Client) -> Self {
        Self {
            http: OpenAiHttpClient::new_with_client(api_key, client),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }
}

#[async_trait]
impl ResponsesTransport for OpenAiResponsesTransport {
    async fn create_response(&self, payload: &Value) -> Result<Value> {
        tracing::debug!("Sending responses request to OpenAI");
        self.http.post(RESPONSES_PATH, payload).await
    }
}
