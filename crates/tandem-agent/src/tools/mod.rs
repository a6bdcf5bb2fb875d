//! Tool vocabulary for agent runs.
//!
//! Every tool the core understands is a [`ToolName`]; the registry resolves
//! names once and the step loop matches on the enum when dispatching.

mod client;
mod control;
mod messages;
mod registry;
mod spawn;
mod subgoals;

pub use client::{
    BROWSER_LOGS_TOOL, CODE_SEARCH_TOOL, READ_FILES_TOOL, RUN_TERMINAL_COMMAND_TOOL,
};
pub use control::{END_TURN_TOOL, SET_OUTPUT_TOOL};
pub use messages::{
    ADD_MESSAGE_TOOL, AddMessageInput, AddMessageRole, SET_MESSAGES_TOOL, SetMessagesInput,
};
pub use registry::{ToolRegistry, ToolSpec, build_tool_registry};
pub use spawn::{
    SPAWN_AGENT_INLINE_TOOL, SPAWN_AGENTS_TOOL, SpawnAgentEntry, SpawnAgentsInput,
};
pub use subgoals::{ADD_SUBGOAL_TOOL, SubgoalInput, UPDATE_SUBGOAL_TOOL};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tandem_llm::{Message, ToolCall, ToolResultOutput};

use crate::ToolError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolName {
    AddSubgoal,
    UpdateSubgoal,
    SetMessages,
    AddMessage,
    SpawnAgents,
    SpawnAgentInline,
    SetOutput,
    EndTurn,
    RunTerminalCommand,
    BrowserLogs,
    CodeSearch,
    ReadFiles,
}

impl ToolName {
    pub const ALL: [ToolName; 12] = [
        ToolName::AddSubgoal,
        ToolName::UpdateSubgoal,
        ToolName::SetMessages,
        ToolName::AddMessage,
        ToolName::SpawnAgents,
        ToolName::SpawnAgentInline,
        ToolName::SetOutput,
        ToolName::EndTurn,
        ToolName::RunTerminalCommand,
        ToolName::BrowserLogs,
        ToolName::CodeSearch,
        ToolName::ReadFiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddSubgoal => ADD_SUBGOAL_TOOL,
            Self::UpdateSubgoal => UPDATE_SUBGOAL_TOOL,
            Self::SetMessages => SET_MESSAGES_TOOL,
            Self::AddMessage => ADD_MESSAGE_TOOL,
            Self::SpawnAgents => SPAWN_AGENTS_TOOL,
            Self::SpawnAgentInline => SPAWN_AGENT_INLINE_TOOL,
            Self::SetOutput => SET_OUTPUT_TOOL,
            Self::EndTurn => END_TURN_TOOL,
            Self::RunTerminalCommand => RUN_TERMINAL_COMMAND_TOOL,
            Self::BrowserLogs => BROWSER_LOGS_TOOL,
            Self::CodeSearch => CODE_SEARCH_TOOL,
            Self::ReadFiles => READ_FILES_TOOL,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    /// Tools satisfied by the connected client rather than the server.
    pub fn is_client_tool(&self) -> bool {
        matches!(
            self,
            Self::RunTerminalCommand | Self::BrowserLogs | Self::CodeSearch | Self::ReadFiles
        )
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one tool call, recorded as a tool-role message.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output,
            is_error: false,
        }
    }

    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: tool_error_output(message),
            is_error: true,
        }
    }

    pub fn to_message(&self) -> Message {
        Message::tool_result(
            self.tool_call_id.clone(),
            self.tool_name.clone(),
            vec![ToolResultOutput::json(self.output.clone())],
        )
    }
}

pub fn tool_error_output(message: impl Into<String>) -> Value {
    json!({ "errorMessage": message.into() })
}

/// Arguments of a call. Raw argument text, when the provider kept it, wins
/// over the parsed value and must be valid JSON.
pub(crate) fn parse_tool_arguments(call: &ToolCall) -> Result<Value, ToolError> {
    match call.raw_arguments.as_deref().map(str::trim) {
        None => Ok(call.arguments.clone()),
        Some("") => Ok(json!({})),
        Some(raw) => serde_json::from_str(raw).map_err(|error| {
            ToolError::Validation(format!(
                "invalid JSON arguments for tool '{}': {error}",
                call.name
            ))
        }),
    }
}

pub(crate) fn deserialize_arguments<T: DeserializeOwned>(
    tool_name: &str,
    arguments: Value,
) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|error| {
        ToolError::Validation(format!("invalid arguments for tool '{tool_name}': {error}"))
    })
}

/// Checks arguments against the subset of JSON schema the tool definitions
/// use: `type`, `required`, `properties`, `additionalProperties`, `enum` and
/// array `items`, recursively.
pub fn validate_tool_arguments(schema: &Value, arguments: &Value) -> Result<(), ToolError> {
    if !arguments.is_object() {
        return Err(ToolError::Validation(
            "tool arguments must be a JSON object".to_string(),
        ));
    }
    if !schema.is_object() {
        return Err(ToolError::Validation(
            "tool schema root must be a JSON object".to_string(),
        ));
    }
    check_value(schema, arguments, "")
}

/// Checks a tool result against the tool's declared output schema.
pub fn validate_tool_output(
    tool_name: &str,
    schema: &Value,
    output: &Value,
) -> Result<(), ToolError> {
    check_value(schema, output, "").map_err(|error| {
        let detail = match error {
            ToolError::Validation(message) => message,
            other => other.to_string(),
        };
        ToolError::Validation(format!("invalid output from tool '{tool_name}': {detail}"))
    })
}

fn check_value(schema: &Value, value: &Value, path: &str) -> Result<(), ToolError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !has_type(value, expected) {
            let message = if path.is_empty() {
                format!("tool arguments must be of type '{expected}'")
            } else {
                format!(
                    "argument '{path}' expected type '{expected}' but received '{}'",
                    json_type_name(value)
                )
            };
            return Err(ToolError::Validation(message));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(ToolError::Validation(format!(
                "argument '{path}' must be one of {}",
                Value::Array(allowed.clone())
            )));
        }
    }

    match value {
        Value::Object(fields) => check_object(schema, fields, path),
        Value::Array(items) => match schema.get("items") {
            Some(item_schema) => items.iter().enumerate().try_for_each(|(index, item)| {
                check_value(item_schema, item, &format!("{path}[{index}]"))
            }),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

fn check_object(
    schema: &Value,
    fields: &serde_json::Map<String, Value>,
    path: &str,
) -> Result<(), ToolError> {
    let child_path = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        }
    };

    let required = schema.get("required").and_then(Value::as_array);
    for key in required.into_iter().flatten().filter_map(Value::as_str) {
        if !fields.contains_key(key) {
            return Err(ToolError::Validation(format!(
                "missing required argument '{}'",
                child_path(key)
            )));
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
    for (key, field) in fields {
        match properties.and_then(|properties| properties.get(key)) {
            Some(property) => check_value(property, field, &child_path(key))?,
            None if closed => {
                return Err(ToolError::Validation(format!(
                    "unexpected argument '{}' not allowed by schema",
                    child_path(key)
                )));
            }
            None => {}
        }
    }
    Ok(())
}

fn has_type(value: &Value, expected: &str) -> bool {
    match expected {
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
