use super::retry::{CallTracer, JitterSource, Sleeper};
use super::ResponsesTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum Scripted {
    Response(Value),
    Failure { status: Option<u16>, message: String },
}

/// Scripted transport. Outcomes are served in order and the last one repeats.
/// With nothing scripted it echoes a single `output_text` item.
#[derive(Clone)]
pub struct MockResponsesTransport {
    script: Arc<Mutex<Vec<Scripted>>>,
    payloads: Arc<Mutex<Vec<Value>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockResponsesTransport {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Vec::new())),
            payloads: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_response(self, response: Value) -> Self {
        self.script.lock().unwrap().push(Scripted::Response(response));
        self
    }

    pub fn with_failure(self, status: Option<u16>, message: &str) -> Self {
        self.script.lock().unwrap().push(Scripted::Failure {
            status,
            message: message.to_string(),
        });
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Payloads received so far, oldest first.
    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }

    fn default_response() -> Value {
        json!({
            "id": format!("resp_{}", uuid::Uuid::new_v4().simple()),
            "output": [{"type": "output_text", "text": "This is a mock response."}]
        })
    }
}

impl Default for MockResponsesTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponsesTransport for MockResponsesTransport {
    async fn create_response(&self, payload: &Value) -> Result<Value> {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;
        self.payloads.lock().unwrap().push(payload.clone());

        let script = self.script.lock().unwrap();
        let index = (*count - 1).min(script.len().saturating_sub(1));
        match script.get(index) {
            None => Ok(Self::default_response()),
            Some(Scripted::Response(value)) => Ok(value.clone()),
            Some(Scripted::Failure { status, message }) => {
                Err(Error::provider(*status, message.clone()))
            }
        }
    }
}

/// Records requested sleeps without waiting.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded_millis(&self) -> Vec<u64> {
        self.sleeps
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn next_unit(&self) -> f64 {
        self.0
    }
}

/// Records the operation name of every traced call.
#[derive(Clone, Default)]
pub struct RecordingTracer {
    operations: Arc<Mutex<Vec<String>>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallTracer for RecordingTracer {
    async fn trace<'a>(
        &self,
        operation: &str,
        call: BoxFuture<'a, Result<Value>>,
    ) -> Result<Value> {
        self.operations.lock().unwrap().push(operation.to_string());
        call.await
    }
}
