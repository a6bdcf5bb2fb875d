use serde::{Deserialize, Serialize};
use tandem_llm::Message;

/// Histories are stored per agent within a session.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub session_id: String,
    pub agent_id: String,
}

impl HistoryKey {
    pub fn new(session_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: agent_id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredHistory {
    pub key: HistoryKey,
    /// Starts at 1 and increases only when the saved content changes.
    pub revision: u64,
    pub content_hash: String,
    pub messages: Vec<Message>,
}
