//! Provider stream events.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::LlmError;
use crate::types::{FinishReason, ToolCall, Usage};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta {
        delta: String,
    },
    ReasoningDelta {
        delta: String,
    },
    ToolCallStart {
        id: String,
        name: String,
    },
    ToolCallDelta {
        id: String,
        arguments_delta: String,
    },
    /// Carries the fully parsed call. Providers that only stream deltas may
    /// send a call with `Value::Null` arguments and let the accumulator parse
    /// the buffered deltas.
    ToolCallEnd {
        tool_call: ToolCall,
    },
    Finish {
        reason: FinishReason,
        #[serde(default)]
        usage: Usage,
    },
}

pub type StreamEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;
