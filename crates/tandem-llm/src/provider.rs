//! Provider adapter contract.

use async_trait::async_trait;

use crate::errors::LlmError;
use crate::stream::StreamEventStream;
use crate::types::Request;

/// A model provider able to stream one completion.
///
/// Adapters report transient failures with `LlmError::Provider { retryable: true }`
/// or `LlmError::Stream`; the [`crate::Client`] decides whether to retry.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn stream(&self, request: Request) -> Result<StreamEventStream, LlmError>;
}
