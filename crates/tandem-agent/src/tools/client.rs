//! Tools satisfied by the connected client. The server only validates the
//! input and forwards it through the bridge.

use serde_json::json;
use tandem_llm::ToolDefinition;

use super::{ToolName, ToolSpec};

pub const RUN_TERMINAL_COMMAND_TOOL: &str = "run_terminal_command";
pub const BROWSER_LOGS_TOOL: &str = "browser_logs";
pub const CODE_SEARCH_TOOL: &str = "code_search";
pub const READ_FILES_TOOL: &str = "read_files";

pub(super) fn run_terminal_command_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::RunTerminalCommand,
        definition: ToolDefinition {
            name: RUN_TERMINAL_COMMAND_TOOL.to_string(),
            description: "Run a shell command in the user's project directory.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": { "type": "string" },
                    "process_type": { "type": "string", "enum": ["SYNC", "BACKGROUND"] },
                    "cwd": { "type": "string" },
                    "timeout_seconds": { "type": "number" }
                },
                "additionalProperties": false
            }),
        },
        ends_agent_step: false,
        output_schema: Some(json!({
            "type": "object",
            "properties": {
                "command": { "type": "string" },
                "stdout": { "type": "string" },
                "stderr": { "type": "string" },
                "exitCode": { "type": "integer" }
            }
        })),
    }
}

pub(super) fn browser_logs_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::BrowserLogs,
        definition: ToolDefinition {
            name: BROWSER_LOGS_TOOL.to_string(),
            description: "Navigate the user's browser and collect console logs.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["type", "url"],
                "properties": {
                    "type": { "type": "string", "enum": ["navigate"] },
                    "url": { "type": "string" }
                },
                "additionalProperties": false
            }),
        },
        ends_agent_step: false,
        output_schema: None,
    }
}

pub(super) fn code_search_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::CodeSearch,
        definition: ToolDefinition {
            name: CODE_SEARCH_TOOL.to_string(),
            description: "Search the user's project with a regular expression.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["pattern"],
                "properties": {
                    "pattern": { "type": "string" },
                    "flags": { "type": "string" },
                    "cwd": { "type": "string" }
                },
                "additionalProperties": false
            }),
        },
        ends_agent_step: false,
        output_schema: None,
    }
}

pub(super) fn read_files_tool() -> ToolSpec {
    ToolSpec {
        name: ToolName::ReadFiles,
        definition: ToolDefinition {
            name: READ_FILES_TOOL.to_string(),
            description: "Read one or more files from the user's project.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["paths"],
                "properties": {
                    "paths": { "type": "array" }
                },
                "additionalProperties": false
            }),
        },
        ends_agent_step: false,
        output_schema: None,
    }
}
