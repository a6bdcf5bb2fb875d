use crate::AgentError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type EventData = HashMap<String, Value>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentStart,
    AgentEnd,
    AssistantTextDelta,
    ReasoningDelta,
    ToolCallStart,
    ToolCallEnd,
    SubagentSpawned,
    SubagentFinished,
    StepLimit,
    Warning,
    Error,
}

/// UI-facing event. Rendering is the sink's job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub kind: EventKind,
    pub timestamp: String,
    pub agent_id: String,
    pub data: EventData,
}

impl AgentEvent {
    pub fn new(kind: EventKind, agent_id: impl Into<String>, data: EventData) -> Self {
        Self {
            kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
            agent_id: agent_id.into(),
            data,
        }
    }

    pub fn agent_start(agent_id: impl Into<String>, agent_type: &str) -> Self {
        Self::new(
            EventKind::AgentStart,
            agent_id,
            EventData::from([("agent_type".to_string(), json!(agent_type))]),
        )
    }

    pub fn agent_end(agent_id: impl Into<String>, status: &str, steps_taken: usize) -> Self {
        Self::new(
            EventKind::AgentEnd,
            agent_id,
            EventData::from([
                ("status".to_string(), json!(status)),
                ("steps_taken".to_string(), json!(steps_taken)),
            ]),
        )
    }

    pub fn text_delta(agent_id: impl Into<String>, delta: &str) -> Self {
        Self::new(
            EventKind::AssistantTextDelta,
            agent_id,
            EventData::from([("delta".to_string(), json!(delta))]),
        )
    }

    pub fn reasoning_delta(agent_id: impl Into<String>, delta: &str) -> Self {
        Self::new(
            EventKind::ReasoningDelta,
            agent_id,
            EventData::from([("delta".to_string(), json!(delta))]),
        )
    }

    pub fn tool_call_start(
        agent_id: impl Into<String>,
        tool_name: &str,
        tool_call_id: &str,
        arguments: Value,
    ) -> Self {
        Self::new(
            EventKind::ToolCallStart,
            agent_id,
            EventData::from([
                ("tool_name".to_string(), json!(tool_name)),
                ("call_id".to_string(), json!(tool_call_id)),
                ("arguments".to_string(), arguments),
            ]),
        )
    }

    pub fn tool_call_end(
        agent_id: impl Into<String>,
        tool_call_id: &str,
        output: Value,
        is_error: bool,
    ) -> Self {
        Self::new(
            EventKind::ToolCallEnd,
            agent_id,
            EventData::from([
                ("call_id".to_string(), json!(tool_call_id)),
                ("output".to_string(), output),
                ("is_error".to_string(), json!(is_error)),
            ]),
        )
    }

    pub fn subagent_spawned(
        parent_id: impl Into<String>,
        child_id: &str,
        agent_type: &str,
        inline: bool,
    ) -> Self {
        Self::new(
            EventKind::SubagentSpawned,
            parent_id,
            EventData::from([
                ("child_id".to_string(), json!(child_id)),
                ("agent_type".to_string(), json!(agent_type)),
                ("inline".to_string(), json!(inline)),
            ]),
        )
    }

    pub fn subagent_finished(parent_id: impl Into<String>, child_id: &str, success: bool) -> Self {
        Self::new(
            EventKind::SubagentFinished,
            parent_id,
            EventData::from([
                ("child_id".to_string(), json!(child_id)),
                ("success".to_string(), json!(success)),
            ]),
        )
    }

    pub fn step_limit(agent_id: impl Into<String>, max_steps: usize) -> Self {
        Self::new(
            EventKind::StepLimit,
            agent_id,
            EventData::from([("max_agent_steps".to_string(), json!(max_steps))]),
        )
    }

    pub fn warning(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            EventKind::Warning,
            agent_id,
            EventData::from([("message".to_string(), json!(message.into()))]),
        )
    }

    pub fn error(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            EventKind::Error,
            agent_id,
            EventData::from([("message".to_string(), json!(message.into()))]),
        )
    }
}

pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: AgentEvent) -> Result<(), AgentError>;
}

#[derive(Default)]
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: AgentEvent) -> Result<(), AgentError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct BufferedEventEmitter {
    inner: Arc<Mutex<Vec<AgentEvent>>>,
}

impl BufferedEventEmitter {
    pub fn snapshot(&self) -> Vec<AgentEvent> {
        let guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<AgentEvent> {
        self.snapshot()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }
}

impl EventEmitter for BufferedEventEmitter {
    fn emit(&self, event: AgentEvent) -> Result<(), AgentError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AgentError::Fatal("buffered emitter mutex poisoned".to_string()))?;
        guard.push(event);
        Ok(())
    }
}
