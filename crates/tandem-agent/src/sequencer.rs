//! Per-turn ordering of tool-call side effects.
//!
//! Handlers of one batch run concurrently, but results are recorded strictly
//! in emission order: the record step for call `i` waits until call `i - 1`
//! has finished and recorded. Handlers that mutate agent state must await
//! their [`PreviousFinished`] handle first.

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{Shared, join_all};
use serde_json::Value;
use std::future::Future;
use tandem_llm::ToolCall;
use tracing::{debug, warn};

use crate::tools::{ToolRegistry, ToolResult};
use crate::AgentError;

/// Resolves once the previous call of the batch has finished and recorded.
#[derive(Clone)]
pub struct PreviousFinished {
    inner: Option<Shared<oneshot::Receiver<()>>>,
}

impl PreviousFinished {
    /// Handle for the first call of a batch.
    pub fn ready() -> Self {
        Self { inner: None }
    }

    pub async fn wait(&self) {
        if let Some(inner) = &self.inner {
            // A dropped sender means the predecessor is gone; either way it is done.
            let _ = inner.clone().await;
        }
    }
}

/// Signals the successor on drop, so a failed handler never blocks it.
struct Completion {
    sender: Option<oneshot::Sender<()>>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(());
        }
    }
}

fn chain(len: usize) -> Vec<(PreviousFinished, Completion)> {
    let mut previous = PreviousFinished::ready();
    let mut links = Vec::with_capacity(len);
    for _ in 0..len {
        let (sender, receiver) = oneshot::channel();
        links.push((
            previous,
            Completion {
                sender: Some(sender),
            },
        ));
        previous = PreviousFinished {
            inner: Some(receiver.shared()),
        };
    }
    links
}

#[derive(Clone, Debug, PartialEq)]
pub struct SequencedBatch {
    /// In emission order.
    pub results: Vec<ToolResult>,
    pub ends_agent_step: bool,
}

pub struct ToolCallSequencer<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> ToolCallSequencer<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Runs `handler` for every call and `record`s each result in emission
    /// order. Tool errors become error payloads; any other error is recorded
    /// as an error payload too and returned once the whole batch has settled.
    pub async fn run<H, Fut, R>(
        &self,
        calls: Vec<ToolCall>,
        handler: H,
        record: R,
    ) -> Result<SequencedBatch, AgentError>
    where
        H: Fn(ToolCall, PreviousFinished) -> Fut,
        Fut: Future<Output = Result<Value, AgentError>>,
        R: Fn(&ToolCall, &ToolResult) -> Result<(), AgentError>,
    {
        let ends_agent_step = calls
            .iter()
            .any(|call| self.registry.ends_agent_step(&call.name));
        let links = chain(calls.len());

        let handler = &handler;
        let record = &record;
        let entries = calls
            .into_iter()
            .zip(links)
            .map(|(call, (previous, completion))| async move {
                let outcome = handler(call.clone(), previous.clone()).await;
                previous.wait().await;

                let (result, fatal) = match outcome {
                    Ok(output) => (ToolResult::success(&call, output), None),
                    Err(AgentError::Tool(error)) => {
                        debug!(tool = %call.name, call_id = %call.id, error = %error, "tool call failed");
                        (ToolResult::error(&call, error.to_string()), None)
                    }
                    Err(error) => {
                        warn!(tool = %call.name, call_id = %call.id, error = %error, "tool call aborted the batch");
                        (ToolResult::error(&call, error.to_string()), Some(error))
                    }
                };
                let recorded = record(&call, &result);
                drop(completion);
                (result, fatal.or(recorded.err()))
            });

        let mut results = Vec::new();
        let mut first_fatal = None;
        for (result, fatal) in join_all(entries).await {
            results.push(result);
            if first_fatal.is_none() {
                first_fatal = fatal;
            }
        }

        match first_fatal {
            Some(error) => Err(error),
            None => Ok(SequencedBatch {
                results,
                ends_agent_step,
            }),
        }
    }
}
