use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AgentState, RunScope};

/// Where a run is in its step cycle. `Completed` and `Errored` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Streaming,
    DispatchingTools,
    Spawning,
    AwaitingClient,
    Continuing,
    Completed,
    Errored,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "STREAMING",
            Self::DispatchingTools => "DISPATCHING_TOOLS",
            Self::Spawning => "SPAWNING",
            Self::AwaitingClient => "AWAITING_CLIENT",
            Self::Continuing => "CONTINUING",
            Self::Completed => "COMPLETED",
            Self::Errored => "ERRORED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }

    pub fn can_transition_to(&self, next: &RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }

        if self == next || next.is_terminal() {
            return true;
        }

        match self {
            RunPhase::Streaming => matches!(next, RunPhase::DispatchingTools),
            RunPhase::DispatchingTools => matches!(
                next,
                RunPhase::Spawning | RunPhase::AwaitingClient | RunPhase::Continuing
            ),
            RunPhase::Spawning => matches!(next, RunPhase::AwaitingClient | RunPhase::Continuing),
            RunPhase::AwaitingClient => matches!(next, RunPhase::Continuing),
            RunPhase::Continuing => {
                matches!(next, RunPhase::Streaming | RunPhase::DispatchingTools)
            }
            RunPhase::Completed | RunPhase::Errored => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Provider,
    Cancelled,
    Fatal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Errored { kind: ErrorKind, message: String },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Clone, Debug)]
pub struct AgentRunRequest {
    pub agent_type: String,
    pub state: AgentState,
    pub prompt: Option<String>,
    pub params: Option<Value>,
    pub scope: RunScope,
    /// When set, the run uses this system prompt instead of its template's.
    pub parent_system_prompt: Option<String>,
}

impl AgentRunRequest {
    pub fn root(agent_type: impl Into<String>, prompt: impl Into<String>, scope: RunScope) -> Self {
        let agent_type = agent_type.into();
        Self {
            state: AgentState::new(agent_type.clone()),
            agent_type,
            prompt: Some(prompt.into()),
            params: None,
            scope,
            parent_system_prompt: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_state(mut self, state: AgentState) -> Self {
        self.state = state;
        self
    }
}

#[derive(Clone, Debug)]
pub struct AgentRunOutcome {
    pub state: AgentState,
    pub status: RunStatus,
    /// `{"type": <output mode>, "value": …}` or `{"type": "error", "message": …}`.
    pub output: Value,
    pub phases: Vec<RunPhase>,
}
