use serde_json::Value;
use std::collections::HashMap;
use tandem_llm::ToolDefinition;

use super::{ToolName, client, control, messages, spawn, subgoals};
use crate::{AgentError, ToolError};

#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: ToolName,
    pub definition: ToolDefinition,
    /// The loop requests no further model stream once this tool's result is recorded.
    pub ends_agent_step: bool,
    pub output_schema: Option<Value>,
}

#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolName, ToolSpec>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: ToolSpec) {
        self.tools.insert(tool.name, tool);
    }

    pub fn get(&self, name: ToolName) -> Option<&ToolSpec> {
        self.tools.get(&name)
    }

    /// Looks up a tool by the name the model emitted.
    pub fn lookup(&self, name: &str) -> Result<&ToolSpec, ToolError> {
        ToolName::parse(name)
            .and_then(|tool| self.tools.get(&tool))
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    /// Resolves a template's declared tool names once, before the first step.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<ToolName>, AgentError> {
        names
            .iter()
            .map(|name| {
                self.lookup(name).map(|spec| spec.name).map_err(|_| {
                    AgentError::InvalidConfiguration(format!(
                        "template declares unknown tool '{name}'"
                    ))
                })
            })
            .collect()
    }

    pub fn definitions_for(&self, tools: &[ToolName]) -> Vec<ToolDefinition> {
        tools
            .iter()
            .filter_map(|tool| self.tools.get(tool))
            .map(|spec| spec.definition.clone())
            .collect()
    }

    pub fn ends_agent_step(&self, name: &str) -> bool {
        self.lookup(name).is_ok_and(|spec| spec.ends_agent_step)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().map(ToolName::as_str).collect();
        names.sort_unstable();
        names
    }
}

pub fn build_tool_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(subgoals::add_subgoal_tool());
    registry.register(subgoals::update_subgoal_tool());
    registry.register(messages::set_messages_tool());
    registry.register(messages::add_message_tool());
    registry.register(spawn::spawn_agents_tool());
    registry.register(spawn::spawn_agent_inline_tool());
    registry.register(control::set_output_tool());
    registry.register(control::end_turn_tool());
    registry.register(client::run_terminal_command_tool());
    registry.register(client::browser_logs_tool());
    registry.register(client::code_search_tool());
    registry.register(client::read_files_tool());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_registers_every_tool() {
        let registry = build_tool_registry();
        assert_eq!(registry.names().len(), ToolName::ALL.len());
        for tool in ToolName::ALL {
            let spec = registry.get(tool).expect("tool should be registered");
            assert_eq!(spec.definition.name, tool.as_str());
        }
    }

    #[test]
    fn only_spawn_agents_and_end_turn_end_the_step() {
        let registry = build_tool_registry();
        let ending: Vec<_> = ToolName::ALL
            .into_iter()
            .filter(|tool| registry.ends_agent_step(tool.as_str()))
            .collect();
        assert_eq!(ending, vec![ToolName::SpawnAgents, ToolName::EndTurn]);
    }

    #[test]
    fn resolve_rejects_unknown_tool_names() {
        let registry = build_tool_registry();
        let resolved = registry
            .resolve(&["end_turn".to_string(), "read_files".to_string()])
            .expect("known tools resolve");
        assert_eq!(resolved, vec![ToolName::EndTurn, ToolName::ReadFiles]);

        let error = registry
            .resolve(&["write_file".to_string()])
            .expect_err("unknown tool");
        assert!(error.to_string().contains("write_file"));
    }
}
