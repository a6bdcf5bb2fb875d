use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tools::ToolName;

/// Runtime limits for one agent run and everything it spawns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_agent_steps: usize,
    pub max_spawn_depth: usize,
    pub max_program_directives: usize,
    pub stop_sequence: String,
    pub client_tool_timeout_ms: Option<u64>,
    pub tool_output_limits: HashMap<String, usize>,
    pub tool_line_limits: HashMap<String, usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_agent_steps: 25,
            max_spawn_depth: 5,
            max_program_directives: 100,
            stop_sequence: "<end_turn>".to_string(),
            client_tool_timeout_ms: None,
            tool_output_limits: default_tool_output_limits(),
            tool_line_limits: default_tool_line_limits(),
        }
    }
}

impl RunConfig {
    pub fn from_json(value: serde_json::Value) -> Result<Self, crate::AgentError> {
        let config: Self = serde_json::from_value(value)
            .map_err(|error| crate::AgentError::InvalidConfiguration(error.to_string()))?;
        if config.max_agent_steps == 0 {
            return Err(crate::AgentError::InvalidConfiguration(
                "max_agent_steps must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

pub fn default_tool_output_limits() -> HashMap<String, usize> {
    HashMap::from([
        (ToolName::ReadFiles.as_str().to_string(), 50_000),
        (ToolName::RunTerminalCommand.as_str().to_string(), 30_000),
        (ToolName::CodeSearch.as_str().to_string(), 20_000),
        (ToolName::BrowserLogs.as_str().to_string(), 20_000),
    ])
}

pub fn default_tool_line_limits() -> HashMap<String, usize> {
    HashMap::from([
        (ToolName::RunTerminalCommand.as_str().to_string(), 256),
        (ToolName::CodeSearch.as_str().to_string(), 200),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_config_defaults_match_baseline() {
        let config = RunConfig::default();
        assert_eq!(config.max_agent_steps, 25);
        assert_eq!(config.max_spawn_depth, 5);
        assert_eq!(config.stop_sequence, "<end_turn>");
        assert_eq!(config.client_tool_timeout_ms, None);
        assert_eq!(config.tool_output_limits.get("read_files"), Some(&50_000));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config = RunConfig::from_json(json!({
            "max_agent_steps": 3,
            "client_tool_timeout_ms": 1500
        }))
        .expect("config should parse");
        assert_eq!(config.max_agent_steps, 3);
        assert_eq!(config.client_tool_timeout_ms, Some(1500));
        assert_eq!(config.max_spawn_depth, 5);
    }

    #[test]
    fn zero_steps_is_rejected() {
        let error = RunConfig::from_json(json!({"max_agent_steps": 0}))
            .expect_err("zero steps should be rejected");
        assert!(error.to_string().contains("max_agent_steps"));
    }
}
