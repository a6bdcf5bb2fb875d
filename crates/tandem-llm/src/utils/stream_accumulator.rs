//! Stream accumulator that builds a Response from StreamEvent sequences.

use std::collections::HashMap;

use serde_json::Value;

use crate::stream::StreamEvent;
use crate::types::{ContentPart, FinishReason, Message, Response, Role, ToolCall, Usage};

#[derive(Clone, Debug, Default)]
pub struct ResponseSeed {
    pub id: String,
    pub model: String,
    pub provider: String,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
pub struct StreamAccumulator {
    seed: ResponseSeed,
    text: String,
    reasoning: String,
    pending: HashMap<String, PendingToolCall>,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl StreamAccumulator {
    pub fn new(seed: ResponseSeed) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Folds one event in. Returns the tool call when the event completes one.
    pub fn process(&mut self, event: &StreamEvent) -> Option<ToolCall> {
        match event {
            StreamEvent::TextDelta { delta } => {
                self.text.push_str(delta);
                None
            }
            StreamEvent::ReasoningDelta { delta } => {
                self.reasoning.push_str(delta);
                None
            }
            StreamEvent::ToolCallStart { id, name } => {
                self.pending.insert(
                    id.clone(),
                    PendingToolCall {
                        name: name.clone(),
                        arguments: String::new(),
                    },
                );
                None
            }
            StreamEvent::ToolCallDelta {
                id,
                arguments_delta,
            } => {
                self.pending
                    .entry(id.clone())
                    .or_default()
                    .arguments
                    .push_str(arguments_delta);
                None
            }
            StreamEvent::ToolCallEnd { tool_call } => {
                let call = self.complete_tool_call(tool_call);
                self.tool_calls.push(call.clone());
                Some(call)
            }
            StreamEvent::Finish { reason, usage } => {
                self.finish_reason = Some(reason.clone());
                self.usage = Some(usage.clone());
                None
            }
        }
    }

    pub fn response(&self) -> Response {
        let mut parts = Vec::new();
        if !self.reasoning.is_empty() {
            parts.push(ContentPart::reasoning(self.reasoning.clone()));
        }
        if !self.text.is_empty() {
            parts.push(ContentPart::text(self.text.clone()));
        }
        for call in &self.tool_calls {
            parts.push(ContentPart::tool_call(call.clone()));
        }

        let finish_reason = self.finish_reason.clone().unwrap_or(if self.tool_calls.is_empty() {
            FinishReason::Other
        } else {
            FinishReason::ToolCalls
        });

        Response {
            id: self.seed.id.clone(),
            model: self.seed.model.clone(),
            provider: self.seed.provider.clone(),
            message: Message::with_parts(Role::Assistant, parts),
            finish_reason,
            usage: self.usage.clone().unwrap_or_default(),
        }
    }

    fn complete_tool_call(&mut self, tool_call: &ToolCall) -> ToolCall {
        let pending = self.pending.remove(&tool_call.id);
        let mut call = tool_call.clone();
        if call.name.is_empty() {
            if let Some(pending) = &pending {
                call.name = pending.name.clone();
            }
        }
        if call.arguments.is_null() {
            let raw = pending.map(|pending| pending.arguments).unwrap_or_default();
            call.arguments = if raw.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                // Unparseable arguments are kept raw so argument validation can reject them.
                serde_json::from_str(&raw).unwrap_or_else(|_| Value::String(raw.clone()))
            };
            call.raw_arguments = Some(raw);
        }
        call
    }
}
