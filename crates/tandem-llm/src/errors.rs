//! Error taxonomy for provider streams.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String, retryable: bool },
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<LlmError> },
}

impl LlmError {
    pub fn provider(message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            message: message.into(),
            retryable,
        }
    }

    /// Stream interruptions and providers that flag themselves as transient
    /// are retried by the client; everything else surfaces immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Stream(_) => true,
            Self::Configuration(_) | Self::RetriesExhausted { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_interruptions_are_retryable() {
        assert!(LlmError::Stream("reset".to_string()).is_retryable());
        assert!(LlmError::provider("overloaded", true).is_retryable());
        assert!(!LlmError::provider("bad key", false).is_retryable());
        assert!(!LlmError::Configuration("no provider".to_string()).is_retryable());
    }

    #[test]
    fn exhausted_error_reports_last_cause() {
        let error = LlmError::RetriesExhausted {
            attempts: 4,
            last: Box::new(LlmError::Stream("reset".to_string())),
        };
        assert_eq!(
            error.to_string(),
            "retries exhausted after 4 attempts: stream interrupted: reset"
        );
    }
}
