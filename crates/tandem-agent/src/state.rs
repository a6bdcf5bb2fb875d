use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::{AgentContext, MessageHistory};

#[derive(Clone, Debug, PartialEq)]
pub struct AgentState {
    pub agent_id: String,
    pub parent_id: Option<String>,
    pub agent_type: String,
    pub history: MessageHistory,
    pub context: AgentContext,
    pub output: Option<Value>,
    pub steps_taken: usize,
    pub credits_used: u64,
}

impl AgentState {
    pub fn new(agent_type: impl Into<String>) -> Self {
        Self {
            agent_id: Uuid::new_v4().to_string(),
            parent_id: None,
            agent_type: agent_type.into(),
            history: MessageHistory::new(),
            context: AgentContext::default(),
            output: None,
            steps_taken: 0,
            credits_used: 0,
        }
    }

    pub fn child_of(parent_id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Self::new(agent_type)
        }
    }

    pub fn with_history(mut self, history: MessageHistory) -> Self {
        self.history = history;
        self
    }
}

/// State shared between the loop and its tool handlers. The lock is only
/// held for synchronous reads and writes, never across an await.
#[derive(Clone, Debug)]
pub struct SharedAgentState {
    inner: Arc<Mutex<AgentState>>,
}

impl SharedAgentState {
    pub fn new(state: AgentState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut AgentState) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> AgentState {
        self.lock().clone()
    }

    pub fn agent_id(&self) -> String {
        self.lock().agent_id.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ArenaNode {
    parent_id: Option<String>,
    agent_type: String,
}

/// Live agents of a session keyed by id. Parent links are plain lookups.
#[derive(Debug, Default)]
pub struct AgentArena {
    nodes: DashMap<String, ArenaNode>,
}

impl AgentArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent for the lifetime of the returned lease.
    pub fn register(self: &Arc<Self>, state: &AgentState) -> ArenaLease {
        self.nodes.insert(
            state.agent_id.clone(),
            ArenaNode {
                parent_id: state.parent_id.clone(),
                agent_type: state.agent_type.clone(),
            },
        );
        ArenaLease {
            arena: Arc::clone(self),
            agent_id: state.agent_id.clone(),
        }
    }

    pub fn release(&self, agent_id: &str) -> bool {
        self.nodes.remove(agent_id).is_some()
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.nodes.contains_key(agent_id)
    }

    pub fn agent_type(&self, agent_id: &str) -> Option<String> {
        self.nodes.get(agent_id).map(|node| node.agent_type.clone())
    }

    pub fn parent_of(&self, agent_id: &str) -> Option<String> {
        self.nodes
            .get(agent_id)
            .and_then(|node| node.parent_id.clone())
    }

    /// Parent first, root last.
    pub fn ancestors(&self, agent_id: &str) -> Vec<String> {
        let mut ancestors = Vec::new();
        let mut cursor = self.parent_of(agent_id);
        while let Some(parent) = cursor {
            if ancestors.contains(&parent) {
                break;
            }
            cursor = self.parent_of(&parent);
            ancestors.push(parent);
        }
        ancestors
    }

    pub fn children_of(&self, agent_id: &str) -> Vec<String> {
        let mut children: Vec<String> = self
            .nodes
            .iter()
            .filter(|entry| entry.value().parent_id.as_deref() == Some(agent_id))
            .map(|entry| entry.key().clone())
            .collect();
        children.sort_unstable();
        children
    }

    pub fn depth(&self, agent_id: &str) -> usize {
        self.ancestors(agent_id).len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Releases the agent from the arena on drop.
#[derive(Debug)]
pub struct ArenaLease {
    arena: Arc<AgentArena>,
    agent_id: String,
}

impl ArenaLease {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}

impl Drop for ArenaLease {
    fn drop(&mut self) {
        self.arena.release(&self.agent_id);
    }
}
