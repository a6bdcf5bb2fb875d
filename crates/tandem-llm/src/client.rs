use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::LlmError;
use crate::provider::StreamProvider;
use crate::stream::StreamEvent;
use crate::types::{Request, Response};
use crate::utils::stream_accumulator::{ResponseSeed, StreamAccumulator};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Clone, Default)]
pub struct Client {
    providers: HashMap<String, Arc<dyn StreamProvider>>,
    default_provider: Option<String>,
    retry: RetryPolicy,
}

impl Client {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..Default::default()
        }
    }

    pub fn register_provider(&mut self, provider: Arc<dyn StreamProvider>) {
        let name = provider.name().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, provider);
    }

    pub fn set_default_provider(&mut self, provider: impl Into<String>) {
        self.default_provider = Some(provider.into());
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Streams one completion, forwarding each event to `on_event` and folding
    /// them into a [`Response`].
    ///
    /// A retryable failure, whether opening the stream or mid-stream, drops the
    /// partial response and starts over. Tool calls from a failed attempt are
    /// never part of the returned response.
    pub async fn stream_with_retry<F>(
        &self,
        mut request: Request,
        mut on_event: F,
    ) -> Result<Response, LlmError>
    where
        F: FnMut(&StreamEvent) + Send,
    {
        let provider_name = self.resolve_provider(&request)?;
        request.provider = Some(provider_name.clone());
        let provider = self
            .providers
            .get(&provider_name)
            .ok_or_else(|| {
                LlmError::Configuration(format!("provider '{provider_name}' not registered"))
            })?
            .clone();

        let mut attempt = 0u32;
        loop {
            match self
                .stream_once(provider.as_ref(), request.clone(), attempt, &mut on_event)
                .await
            {
                Ok(response) => return Ok(response),
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        provider = %provider_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying model stream"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) if error.is_retryable() => {
                    return Err(LlmError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(error),
                    });
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn stream_once<F>(
        &self,
        provider: &dyn StreamProvider,
        request: Request,
        attempt: u32,
        on_event: &mut F,
    ) -> Result<Response, LlmError>
    where
        F: FnMut(&StreamEvent) + Send,
    {
        let mut accumulator = StreamAccumulator::new(ResponseSeed {
            id: format!("{}-{}", provider.name(), attempt),
            model: request.model.clone(),
            provider: provider.name().to_string(),
        });
        let mut events = provider.stream(request).await?;
        while let Some(event) = events.next().await {
            let event = event?;
            // Tool calls are dispatched from the finished response, not as they complete.
            let _ = accumulator.process(&event);
            on_event(&event);
        }
        debug!(provider = provider.name(), attempt, "model stream finished");
        Ok(accumulator.response())
    }

    fn resolve_provider(&self, request: &Request) -> Result<String, LlmError> {
        if let Some(provider) = &request.provider {
            return Ok(provider.clone());
        }
        if let Some(provider) = &self.default_provider {
            return Ok(provider.clone());
        }
        Err(LlmError::Configuration("no provider configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamEventStream;
    use crate::types::{FinishReason, Message, ToolCall, Usage};
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::json;
    use std::sync::Mutex;

    struct FlakyProvider {
        failures_left: Mutex<u32>,
        calls: Mutex<u32>,
    }

    impl FlakyProvider {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: Mutex::new(failures),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("calls mutex")
        }
    }

    #[async_trait]
    impl StreamProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn stream(&self, _request: Request) -> Result<StreamEventStream, LlmError> {
            *self.calls.lock().expect("calls mutex") += 1;
            let mut failures = self.failures_left.lock().expect("failures mutex");
            if *failures > 0 {
                *failures -= 1;
                // Emits a complete tool call before failing so the test can
                // check it never reaches the final response.
                return Ok(Box::pin(stream::iter(vec![
                    Ok(StreamEvent::ToolCallEnd {
                        tool_call: ToolCall::new("stale", "end_turn", json!({})),
                    }),
                    Err(LlmError::Stream("connection reset".to_string())),
                ])));
            }
            Ok(Box::pin(stream::iter(vec![
                Ok(StreamEvent::TextDelta {
                    delta: "done".to_string(),
                }),
                Ok(StreamEvent::Finish {
                    reason: FinishReason::Stop,
                    usage: Usage::default(),
                }),
            ])))
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    fn request() -> Request {
        Request {
            model: "test-model".to_string(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn retries_transient_stream_errors_and_discards_partial_output() {
        let provider = Arc::new(FlakyProvider::new(2));
        let mut client = Client::new(fast_policy(3));
        client.register_provider(provider.clone());

        let response = client
            .stream_with_retry(request(), |_| {})
            .await
            .expect("third attempt should succeed");

        assert_eq!(provider.calls(), 3);
        assert_eq!(response.text(), "done");
        assert!(response.tool_calls().is_empty());
        assert_eq!(response.model, "test-model");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn exhausting_retries_surfaces_last_error() {
        let provider = Arc::new(FlakyProvider::new(10));
        let mut client = Client::new(fast_policy(2));
        client.register_provider(provider.clone());

        let error = client
            .stream_with_retry(request(), |_| {})
            .await
            .expect_err("retries should be exhausted");

        assert_eq!(provider.calls(), 3);
        match error {
            LlmError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(*last, LlmError::Stream("connection reset".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_provider_is_a_configuration_error() {
        let client = Client::default();
        let error = client
            .stream_with_retry(request(), |_| {})
            .await
            .expect_err("no provider registered");
        assert!(matches!(error, LlmError::Configuration(_)));
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 350,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }
}
