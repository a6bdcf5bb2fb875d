use serde::Deserialize;
use serde_json::{Value, json};
use tandem_llm::ToolDefinition;

use super::{ToolName, ToolSpec};

pub const SPAWN_AGENTS_TOOL: &str = "spawn_agents";
pub const SPAWN_AGENT_INLINE_TOOL: &str = "spawn_agent_inline";

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SpawnAgentEntry {
    pub agent_type: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SpawnAgentsInput {
    pub agents: Vec<SpawnAgentEntry>,
}

fn spawn_entry_schema() -> Value {
    json!({
        "type": "object",
        "required": ["agent_type"],
        "properties": {
            "agent_type": { "type": "string" },
            "prompt": { "type": "string" },
            "params": { "type": "object" }
        },
        "additionalProperties": false
    })
}

pub(super) fn spawn_agents_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::SpawnAgents,
        definition: ToolDefinition {
            name: SPAWN_AGENTS_TOOL.to_string(),
            description: "Spawn multiple agents that run concurrently and return all of their outputs."
                .to_string(),
            parameters: json!({
                "type": "object",
                "required": ["agents"],
                "properties": {
                    "agents": { "type": "array", "items": spawn_entry_schema() }
                },
                "additionalProperties": false
            }),
        },
        ends_agent_step: true,
        output_schema: None,
    }
}

pub(super) fn spawn_agent_inline_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::SpawnAgentInline,
        definition: ToolDefinition {
            name: SPAWN_AGENT_INLINE_TOOL.to_string(),
            description: "Spawn one agent that shares this conversation and continues it in place."
                .to_string(),
            parameters: spawn_entry_schema(),
        },
        ends_agent_step: false,
        output_schema: None,
    }
}
