use serde_json::json;
use tandem_llm::ToolDefinition;

use super::{ToolName, ToolSpec};

pub const SET_OUTPUT_TOOL: &str = "set_output";
pub const END_TURN_TOOL: &str = "end_turn";

pub(super) fn set_output_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::SetOutput,
        definition: ToolDefinition {
            name: SET_OUTPUT_TOOL.to_string(),
            description: "Set the structured output returned to whoever spawned this agent."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": true
            }),
        },
        ends_agent_step: false,
        output_schema: None,
    }
}

pub(super) fn end_turn_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::EndTurn,
        definition: ToolDefinition {
            name: END_TURN_TOOL.to_string(),
            description: "End your turn and hand control back to the user or parent agent."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ends_agent_step: true,
        output_schema: None,
    }
}
