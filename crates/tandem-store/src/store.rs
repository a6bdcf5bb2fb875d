use tandem_llm::Message;

use crate::types::{HistoryKey, StoredHistory};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource not found: {resource} ({id})")]
    NotFound { resource: &'static str, id: String },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Saving identical content twice returns the existing revision.
    async fn save_history(
        &self,
        key: &HistoryKey,
        messages: &[Message],
    ) -> StoreResult<StoredHistory>;

    async fn load_history(&self, key: &HistoryKey) -> StoreResult<Option<StoredHistory>>;

    /// Drops every history saved under `session_id`. Returns how many were removed.
    async fn delete_session(&self, session_id: &str) -> StoreResult<usize>;
}
