use serde::Deserialize;
use serde_json::json;
use tandem_llm::{Message, ToolDefinition};

use super::{ToolName, ToolSpec};

pub const SET_MESSAGES_TOOL: &str = "set_messages";
pub const ADD_MESSAGE_TOOL: &str = "add_message";

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SetMessagesInput {
    pub messages: Vec<Message>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddMessageRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AddMessageInput {
    pub role: AddMessageRole,
    pub content: String,
}

impl AddMessageInput {
    pub fn into_message(self) -> Message {
        match self.role {
            AddMessageRole::User => Message::user(self.content),
            AddMessageRole::Assistant => Message::assistant(self.content),
        }
    }
}

pub(super) fn set_messages_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::SetMessages,
        definition: ToolDefinition {
            name: SET_MESSAGES_TOOL.to_string(),
            description: "Replace the agent's message history with the given messages."
                .to_string(),
            parameters: json!({
                "type": "object",
                "required": ["messages"],
                "properties": {
                    "messages": { "type": "array" }
                },
                "additionalProperties": false
            }),
        },
        ends_agent_step: false,
        output_schema: None,
    }
}

pub(super) fn add_message_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::AddMessage,
        definition: ToolDefinition {
            name: ADD_MESSAGE_TOOL.to_string(),
            description: "Append a user or assistant text message to the agent's history."
                .to_string(),
            parameters: json!({
                "type": "object",
                "required": ["role", "content"],
                "properties": {
                    "role": { "type": "string", "enum": ["user", "assistant"] },
                    "content": { "type": "string" }
                },
                "additionalProperties": false
            }),
        },
        ends_agent_step: false,
        output_schema: None,
    }
}
