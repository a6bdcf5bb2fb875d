use serde::Deserialize;
use serde_json::json;
use tandem_llm::ToolDefinition;

use super::{ToolName, ToolSpec};

pub const ADD_SUBGOAL_TOOL: &str = "add_subgoal";
pub const UPDATE_SUBGOAL_TOOL: &str = "update_subgoal";

/// Shared input shape of `add_subgoal` and `update_subgoal`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SubgoalInput {
    pub id: String,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
}

pub(super) fn add_subgoal_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::AddSubgoal,
        definition: ToolDefinition {
            name: ADD_SUBGOAL_TOOL.to_string(),
            description: "Add a new subgoal for tracking progress. Use for complex multistep tasks."
                .to_string(),
            parameters: json!({
                "type": "object",
                "required": ["id", "objective"],
                "properties": {
                    "id": { "type": "string" },
                    "objective": { "type": "string" },
                    "status": { "type": "string" },
                    "plan": { "type": "string" },
                    "log": { "type": "string" }
                },
                "additionalProperties": false
            }),
        },
        ends_agent_step: false,
        output_schema: None,
    }
}

pub(super) fn update_subgoal_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::UpdateSubgoal,
        definition: ToolDefinition {
            name: UPDATE_SUBGOAL_TOOL.to_string(),
            description: "Update a subgoal's status, plan, or append a log entry.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["id"],
                "properties": {
                    "id": { "type": "string" },
                    "status": { "type": "string" },
                    "plan": { "type": "string" },
                    "log": { "type": "string" }
                },
                "additionalProperties": false
            }),
        },
        ends_agent_step: false,
        output_schema: None,
    }
}
