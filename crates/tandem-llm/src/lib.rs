//! Model-facing types and the streaming client for Tandem.
//!
//! The provider call itself is opaque to the agent core: adapters implement
//! [`StreamProvider`] and the [`Client`] wraps them with bounded retries and
//! folds the event stream into a [`Response`].

pub mod client;
pub mod errors;
pub mod provider;
pub mod stream;
pub mod types;
pub mod utils;

pub use client::{Client, RetryPolicy};
pub use errors::LlmError;
pub use provider::StreamProvider;
pub use stream::{StreamEvent, StreamEventStream};
pub use types::{
    ContentPart, FinishReason, Message, Request, Response, Role, ToolCall, ToolDefinition,
    ToolResultOutput, Usage,
};
pub use utils::stream_accumulator::{ResponseSeed, StreamAccumulator};
