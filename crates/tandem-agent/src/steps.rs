//! Programmatic steps: a template may drive its own loop with a resumable
//! program instead of letting the model run free.

use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum StepDirective {
    /// Execute one tool directly, without a model step.
    ToolCall { tool_name: String, input: Value },
    /// Run exactly one model step, then resume.
    Step,
    /// Run model steps until the turn ends, then resume.
    StepAll,
    Done,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepInput {
    pub step_index: usize,
    pub tool_result: Option<Value>,
    pub ended_turn: bool,
}

pub trait StepProgram: Send + Sync {
    fn resume(&mut self, input: StepInput) -> StepDirective;
}

/// Each run gets a fresh program.
pub trait StepProgramFactory: Send + Sync {
    fn create(&self) -> Box<dyn StepProgram>;
}

/// Plays a fixed list of directives, then reports `Done`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSteps {
    directives: Vec<StepDirective>,
    index: usize,
}

impl ScriptedSteps {
    pub fn new(directives: Vec<StepDirective>) -> Self {
        Self {
            directives,
            index: 0,
        }
    }
}

impl StepProgram for ScriptedSteps {
    fn resume(&mut self, _input: StepInput) -> StepDirective {
        let directive = self
            .directives
            .get(self.index)
            .cloned()
            .unwrap_or(StepDirective::Done);
        self.index += 1;
        directive
    }
}

impl StepProgramFactory for ScriptedSteps {
    fn create(&self) -> Box<dyn StepProgram> {
        Box::new(Self::new(self.directives.clone()))
    }
}
