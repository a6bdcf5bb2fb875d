//! Per-agent scratch state used by the planning tools.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tools::SubgoalInput;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgoal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl Subgoal {
    fn apply(&mut self, input: SubgoalInput) {
        if input.objective.is_some() {
            self.objective = input.objective;
        }
        if input.status.is_some() {
            self.status = input.status;
        }
        if input.plan.is_some() {
            self.plan = input.plan;
        }
        if let Some(log) = input.log {
            self.logs.push(log);
        }
    }
}

/// Subgoal id to subgoal. Entries are never removed during a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentContext {
    subgoals: BTreeMap<String, Subgoal>,
}

impl AgentContext {
    pub fn get(&self, id: &str) -> Option<&Subgoal> {
        self.subgoals.get(id)
    }

    pub fn len(&self) -> usize {
        self.subgoals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subgoals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Subgoal)> {
        self.subgoals.iter()
    }

    /// Adds or overwrites a subgoal. Returns the message reported to the model.
    pub fn add_subgoal(&mut self, input: SubgoalInput) -> String {
        let id = input.id.clone();
        let mut subgoal = Subgoal::default();
        subgoal.apply(input);
        self.subgoals.insert(id, subgoal);
        "Successfully added subgoal".to_string()
    }

    /// Updates a subgoal in place, creating it when the id is unknown.
    pub fn update_subgoal(&mut self, input: SubgoalInput) -> String {
        let id = input.id.clone();
        match self.subgoals.get_mut(&id) {
            Some(subgoal) => {
                subgoal.apply(input);
                "Successfully updated subgoal".to_string()
            }
            None => {
                let mut subgoal = Subgoal::default();
                subgoal.apply(input);
                self.subgoals.insert(id.clone(), subgoal);
                format!("Subgoal with id {id} not found, creating new subgoal")
            }
        }
    }
}
