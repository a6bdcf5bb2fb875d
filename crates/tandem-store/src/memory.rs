use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tandem_llm::Message;

use crate::store::{HistoryStore, StoreError, StoreResult};
use crate::types::{HistoryKey, StoredHistory};

#[derive(Clone, Debug, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<Mutex<BTreeMap<HistoryKey, StoredHistory>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|state| state.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, BTreeMap<HistoryKey, StoredHistory>>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory history store mutex poisoned".to_string()))
    }

    fn content_hash(messages: &[Message]) -> StoreResult<String> {
        let payload = serde_json::to_vec(messages)
            .map_err(|error| StoreError::Serialization(error.to_string()))?;
        Ok(blake3::hash(&payload).to_hex().to_string())
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn save_history(
        &self,
        key: &HistoryKey,
        messages: &[Message],
    ) -> StoreResult<StoredHistory> {
        let content_hash = Self::content_hash(messages)?;
        let mut state = self.lock()?;

        let revision = match state.get(key) {
            Some(existing) if existing.content_hash == content_hash => {
                return Ok(existing.clone());
            }
            Some(existing) => existing.revision + 1,
            None => 1,
        };

        let stored = StoredHistory {
            key: key.clone(),
            revision,
            content_hash,
            messages: messages.to_vec(),
        };
        state.insert(key.clone(), stored.clone());
        Ok(stored)
    }

    async fn load_history(&self, key: &HistoryKey) -> StoreResult<Option<StoredHistory>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn delete_session(&self, session_id: &str) -> StoreResult<usize> {
        let mut state = self.lock()?;
        let before = state.len();
        state.retain(|key, _| key.session_id != session_id);
        Ok(before - state.len())
    }
}
