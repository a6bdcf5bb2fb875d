use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::tools::validate_tool_arguments;
use crate::{AgentError, StepProgramFactory, ToolError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    LastMessage,
    AllMessages,
    StructuredOutput,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastMessage => "lastMessage",
            Self::AllMessages => "allMessages",
            Self::StructuredOutput => "structuredOutput",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Description of the prompt shown to spawning agents.
    #[serde(default)]
    pub prompt: Option<String>,
    /// JSON schema for `params`. Params are rejected when absent.
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Clone, Default)]
pub struct AgentTemplate {
    pub id: String,
    pub display_name: String,
    pub model: String,
    pub spawnable_agents: Vec<String>,
    pub tool_names: Vec<String>,
    pub input_schema: InputSchema,
    pub output_mode: OutputMode,
    pub output_schema: Option<Value>,
    pub include_message_history: bool,
    pub inherit_parent_system_prompt: bool,
    pub system_prompt: String,
    pub instructions_prompt: Option<String>,
    pub step_prompt: Option<String>,
    pub handle_steps: Option<Arc<dyn StepProgramFactory>>,
}

impl std::fmt::Debug for AgentTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTemplate")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("spawnable_agents", &self.spawnable_agents)
            .field("tool_names", &self.tool_names)
            .field("output_mode", &self.output_mode)
            .field("handle_steps", &self.handle_steps.is_some())
            .finish()
    }
}

impl AgentTemplate {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn can_spawn(&self, agent_type: &str) -> bool {
        self.spawnable_agents.iter().any(|allowed| allowed == agent_type)
    }

    /// Prompts are always accepted; params need a declared schema.
    pub fn validate_input(&self, params: Option<&Value>) -> Result<(), ToolError> {
        match (&self.input_schema.params, params) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(ToolError::Validation(format!(
                "agent '{}' does not accept params",
                self.id
            ))),
            (Some(schema), Some(params)) => validate_tool_arguments(schema, params),
            (Some(schema), None) => validate_tool_arguments(schema, &json!({})),
        }
    }

    /// Checks a `set_output` value when the template declares structured output.
    pub fn validate_output(&self, output: &Value) -> Result<(), ToolError> {
        match (&self.output_mode, &self.output_schema) {
            (OutputMode::StructuredOutput, Some(schema)) => validate_tool_arguments(schema, output),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<AgentTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: AgentTemplate) {
        self.templates
            .insert(template.id.clone(), Arc::new(template));
    }

    pub fn get(&self, id: &str) -> Option<Arc<AgentTemplate>> {
        self.templates.get(id).cloned()
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<AgentTemplate>, AgentError> {
        self.get(id)
            .ok_or_else(|| AgentError::TemplateNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn researcher() -> AgentTemplate {
        AgentTemplate {
            input_schema: InputSchema {
                prompt: Some("what to research".to_string()),
                params: Some(json!({
                    "type": "object",
                    "required": ["depth"],
                    "properties": { "depth": { "type": "integer" } }
                })),
            },
            ..AgentTemplate::new("researcher", "test-model")
        }
    }

    #[test]
    fn params_are_checked_against_declared_schema() {
        let template = researcher();
        assert!(template.validate_input(Some(&json!({"depth": 2}))).is_ok());
        let mistyped = template
            .validate_input(Some(&json!({"depth": "deep"})))
            .expect_err("depth must be an integer");
        assert!(mistyped.to_string().contains("depth"));
        let missing = template.validate_input(None).expect_err("depth is required");
        assert!(missing.to_string().contains("missing required argument 'depth'"));
    }

    #[test]
    fn params_without_schema_are_rejected() {
        let template = AgentTemplate::new("base", "test-model");
        assert!(template.validate_input(None).is_ok());
        assert!(template.validate_input(Some(&json!({"x": 1}))).is_err());
    }

    #[test]
    fn registry_reports_missing_templates() {
        let mut registry = TemplateRegistry::new();
        registry.register(researcher());
        assert!(registry.resolve("researcher").is_ok());
        let error = registry.resolve("ghost").expect_err("unknown template");
        assert!(matches!(error, AgentError::TemplateNotFound(id) if id == "ghost"));
    }

    #[test]
    fn structured_output_is_validated_only_in_structured_mode() {
        let mut template = AgentTemplate::new("base", "test-model");
        template.output_schema = Some(json!({
            "type": "object",
            "required": ["answer"],
            "properties": { "answer": { "type": "string" } }
        }));
        assert!(template.validate_output(&json!({})).is_ok());

        template.output_mode = OutputMode::StructuredOutput;
        assert!(template.validate_output(&json!({})).is_err());
        assert!(template.validate_output(&json!({"answer": "42"})).is_ok());
    }
}
