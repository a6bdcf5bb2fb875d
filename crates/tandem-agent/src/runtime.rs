//! Collaborators shared by every run of a session.

use async_trait::async_trait;
use std::sync::Arc;
use tandem_llm::{Client, Usage};
use tandem_store::HistoryStore;

use crate::tools::{ToolRegistry, build_tool_registry};
use crate::{
    AgentArena, AgentError, ClientBridge, EventEmitter, NoopEventEmitter, RunConfig,
    SessionRegistry, TemplateRegistry,
};

#[derive(Clone, Debug, PartialEq)]
pub struct CreditCharge {
    pub agent_id: String,
    pub agent_type: String,
    pub model: String,
    pub usage: Usage,
}

/// Billing hook called after every model stream. Returns the credits charged.
#[async_trait]
pub trait CreditConsumer: Send + Sync {
    async fn consume(&self, charge: CreditCharge) -> Result<u64, AgentError>;
}

#[derive(Default)]
pub struct NoopCreditConsumer;

#[async_trait]
impl CreditConsumer for NoopCreditConsumer {
    async fn consume(&self, _charge: CreditCharge) -> Result<u64, AgentError> {
        Ok(0)
    }
}

pub struct RunDeps {
    pub client: Arc<Client>,
    pub sessions: Arc<SessionRegistry>,
    pub bridge: Arc<ClientBridge>,
    pub templates: Arc<TemplateRegistry>,
    pub arena: Arc<AgentArena>,
    pub tools: Arc<ToolRegistry>,
    pub credits: Arc<dyn CreditConsumer>,
    pub events: Arc<dyn EventEmitter>,
    pub history_store: Option<Arc<dyn HistoryStore>>,
    pub config: RunConfig,
}

impl RunDeps {
    /// Wires the in-memory defaults around a model client and template set.
    pub fn new(client: Client, templates: TemplateRegistry) -> Self {
        let sessions = Arc::new(SessionRegistry::default());
        Self {
            client: Arc::new(client),
            bridge: Arc::new(ClientBridge::new(sessions.clone())),
            sessions,
            templates: Arc::new(templates),
            arena: Arc::new(AgentArena::new()),
            tools: Arc::new(build_tool_registry()),
            credits: Arc::new(NoopCreditConsumer),
            events: Arc::new(NoopEventEmitter),
            history_store: None,
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventEmitter>) -> Self {
        self.events = events;
        self
    }

    pub fn with_credits(mut self, credits: Arc<dyn CreditConsumer>) -> Self {
        self.credits = credits;
        self
    }

    pub fn with_history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history_store = Some(store);
        self
    }
}
