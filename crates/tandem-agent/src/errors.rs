use thiserror::Error;

/// Recoverable tool failures. The sequencer turns these into error payloads
/// on the tool result instead of aborting the run.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("{0}")]
    Execution(String),
    #[error("client disconnected before responding to tool call '{tool_call_id}'")]
    ClientDisconnected { tool_call_id: String },
    #[error("tool call '{tool_call_id}' timed out after {timeout_ms}ms")]
    Timeout { tool_call_id: String, timeout_ms: u64 },
}

/// Top-level error type for the tandem-agent crate.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent template not found: {0}")]
    TemplateNotFound(String),
    #[error("invalid agent input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("fatal: {0}")]
    Fatal(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Llm(#[from] tandem_llm::LlmError),
    #[error(transparent)]
    Store(#[from] tandem_store::StoreError),
}

impl AgentError {
    /// Tool errors are reported back to the model; everything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Tool(_))
    }
}
