//! Retry policy for provider calls.
//!
//! Transient failures are retried with exponential backoff plus jitter. Sleep,
//! jitter and call tracing are injected so the schedule is deterministic under
//! test.

use crate::{Error, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use rand::Rng;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::Instrument;

const RETRYABLE_STATUSES: [u16; 3] = [408, 409, 429];
const RETRYABLE_MESSAGES: [&str; 5] = ["timeout", "timed out", "econnreset", "network", "rate"];

// 2^n * 100ms => 200, 400, 800, ...
const BACKOFF_BASE_MS: u64 = 2;
const BACKOFF_FACTOR: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    pub max_delay: Duration,
    /// Jitter is drawn from `[0, max_jitter_ms)`.
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_delay: Duration::from_millis(5000),
            max_jitter_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Delays before attempts 2..=max_attempts, without jitter.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(BACKOFF_BASE_MS)
            .factor(BACKOFF_FACTOR)
            .max_delay(self.max_delay)
            .take(self.max_attempts.saturating_sub(1))
    }

    pub fn jitter(&self, unit: f64) -> Duration {
        if self.max_jitter_ms == 0 {
            return Duration::ZERO;
        }
        let ms = (unit.max(0.0) * self.max_jitter_ms as f64).floor() as u64;
        Duration::from_millis(ms.min(self.max_jitter_ms - 1))
    }
}

/// Whether `err` is worth another attempt.
pub fn is_retryable(err: &Error) -> bool {
    if let Some(status) = err.status() {
        if RETRYABLE_STATUSES.contains(&status) || (500..=599).contains(&status) {
            return true;
        }
    }

    if let Error::Http(e) = err {
        if e.is_timeout() || e.is_connect() {
            return true;
        }
    }

    let message = err.to_string().to_lowercase();
    RETRYABLE_MESSAGES
        .iter()
        .any(|needle| message.contains(needle))
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Source of uniform values in `[0, 1)`.
pub trait JitterSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

pub struct RandJitter;

impl JitterSource for RandJitter {
    fn next_unit(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Wraps each provider call, e.g. to attach a span or record timings.
#[async_trait]
pub trait CallTracer: Send + Sync {
    async fn trace<'a>(
        &self,
        operation: &str,
        call: BoxFuture<'a, Result<Value>>,
    ) -> Result<Value>;
}

pub struct SpanTracer;

#[async_trait]
impl CallTracer for SpanTracer {
    async fn trace<'a>(
        &self,
        operation: &str,
        call: BoxFuture<'a, Result<Value>>,
    ) -> Result<Value> {
        let span = tracing::info_span!("provider_call", operation = %operation);
        call.instrument(span).await
    }
}

/// Run `attempt` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned unchanged.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    jitter: &dyn JitterSource,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delays = policy.backoff();
    let mut number = 1;

    loop {
        let err = match attempt(number).await {
            Ok(value) => {
                if number > 1 {
                    tracing::info!("Provider call succeeded on attempt {}", number);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            tracing::error!("Provider call failed with non-retryable error: {}", err);
            return Err(err);
        }

        let Some(delay) = delays.next() else {
            tracing::error!("Provider call failed after {} attempts: {}", number, err);
            return Err(err);
        };

        let wait = delay + policy.jitter(jitter.next_unit());
        tracing::warn!(
            "Attempt {}/{} failed: {}. Retrying in {}ms",
            number,
            policy.max_attempts,
            err,
            wait.as_millis()
        );
        sleeper.sleep(wait).await;
        number += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::{FixedJitter, RecordingSleeper};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_backoff_schedule_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 8,
            ..Default::default()
        };
        let delays: Vec<u128> = policy.backoff().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![200, 400, 800, 1600, 3200, 5000, 5000]);
    }

    #[test]
    fn test_default_policy_allows_four_retries() {
        assert_eq!(RetryPolicy::default().backoff().count(), 4);
    }

    #[test]
    fn test_jitter_stays_below_bound() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.jitter(0.0), Duration::ZERO);
        assert_eq!(policy.jitter(0.8), Duration::from_millis(80));
        assert_eq!(policy.jitter(1.0), Duration::from_millis(99));
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 409, 429, 500, 503, 599] {
            assert!(is_retryable(&Error::provider(Some(status), "boom")), "{}", status);
        }
        for status in [400, 401, 404, 422] {
            assert!(!is_retryable(&Error::provider(Some(status), "boom")), "{}", status);
        }
    }

    #[test]
    fn test_retryable_messages_are_case_insensitive() {
        assert!(is_retryable(&Error::provider(None, "Request TIMEOUT")));
        assert!(is_retryable(&Error::provider(None, "socket ECONNRESET")));
        assert!(is_retryable(&Error::provider(None, "Network unreachable")));
        assert!(is_retryable(&Error::provider(None, "Rate limit exceeded")));
        assert!(!is_retryable(&Error::provider(None, "invalid model")));
        assert!(!is_retryable(&Error::InvalidInput("bad".to_string())));
    }

    #[tokio::test]
    async fn test_three_failures_then_success_sleeps_on_schedule() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicUsize::new(0);

        let result = retry_with_backoff(
            &RetryPolicy::default(),
            &sleeper,
            &FixedJitter(0.8),
            |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(Error::provider(Some(500), "server error"))
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(result, "done");
        assert_eq!(
            sleeper.recorded_millis(),
            vec![280, 480, 880]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicUsize::new(0);

        let err = retry_with_backoff::<(), _, _>(
            &RetryPolicy::default(),
            &sleeper,
            &FixedJitter(0.0),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(Error::provider(Some(500), format!("failure {}", attempt))) }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(err.to_string().contains("failure 5"));
        assert_eq!(sleeper.recorded_millis().len(), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicUsize::new(0);

        let err = retry_with_backoff::<(), _, _>(
            &RetryPolicy::default(),
            &sleeper,
            &FixedJitter(0.5),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::provider(Some(400), "bad request")) }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.status(), Some(400));
        assert!(sleeper.recorded_millis().is_empty());
    }

    #[tokio::test]
    async fn test_span_tracer_passes_result_through() {
        let value = SpanTracer
            .trace("responses.create", Box::pin(async { Ok(serde_json::json!({"id": "r"})) }))
            .await
            .unwrap();
        assert_eq!(value["id"], "r");
    }
}
