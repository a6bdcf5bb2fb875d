//! Delegation of tool calls to the connected client.
//!
//! Requests are correlated with responses by session and `tool_call_id`. A
//! pending request ends in exactly one way: the client answers, the session disconnects, the
//! run is cancelled, or the optional timeout fires.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tandem_llm::ToolCall;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::protocol::{ServerAction, ServerMessage};
use crate::{AgentError, RunScope, SessionRegistry, ToolError};

type PendingSender = oneshot::Sender<Result<Value, ToolError>>;

/// Tool call ids are only unique within one assistant turn, so sessions may
/// reuse them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PendingKey {
    session_id: String,
    tool_call_id: String,
}

impl PendingKey {
    fn new(session_id: &str, tool_call_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            tool_call_id: tool_call_id.to_string(),
        }
    }
}

struct PendingRequest {
    nonce: u64,
    sender: PendingSender,
}

pub struct ClientBridge {
    sessions: Arc<SessionRegistry>,
    pending: DashMap<PendingKey, PendingRequest>,
    next_nonce: AtomicU64,
}

/// Drops the pending entry when the awaiting side gives up. Only the entry
/// this request inserted is removed.
struct PendingGuard<'a> {
    pending: &'a DashMap<PendingKey, PendingRequest>,
    key: PendingKey,
    nonce: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .remove_if(&self.key, |_, request| request.nonce == self.nonce);
    }
}

impl ClientBridge {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            sessions,
            pending: DashMap::new(),
            next_nonce: AtomicU64::new(0),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Sends the call to the client and waits for its answer.
    ///
    /// Disconnects and timeouts are tool errors; cancellation of the run is
    /// returned as [`AgentError::Cancelled`].
    pub async fn request_tool_call(
        &self,
        scope: &RunScope,
        call: &ToolCall,
        input: Value,
        timeout_ms: Option<u64>,
    ) -> Result<Value, AgentError> {
        if scope.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let key = PendingKey::new(&scope.session_id, &call.id);
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        match self.pending.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(ToolError::Validation(format!(
                    "tool call id '{}' is already pending for this session",
                    call.id
                ))
                .into());
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest { nonce, sender });
            }
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            key,
            nonce,
        };

        let request = ServerMessage::Action {
            data: ServerAction::ToolCallRequest {
                user_input_id: scope.user_input_id.clone(),
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                input,
                timeout_ms,
            },
        };
        if !self.sessions.send(&scope.session_id, request) {
            warn!(session_id = %scope.session_id, tool = %call.name, "no client connection for tool call");
            return Err(ToolError::ClientDisconnected {
                tool_call_id: call.id.clone(),
            }
            .into());
        }
        debug!(session_id = %scope.session_id, tool = %call.name, call_id = %call.id, "tool call delegated to client");

        let deadline = async {
            match timeout_ms {
                Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            response = receiver => match response {
                Ok(result) => result.map_err(AgentError::from),
                Err(_) => Err(ToolError::ClientDisconnected { tool_call_id: call.id.clone() }.into()),
            },
            _ = scope.cancel.cancelled() => Err(AgentError::Cancelled),
            _ = deadline => Err(ToolError::Timeout {
                tool_call_id: call.id.clone(),
                timeout_ms: timeout_ms.unwrap_or_default(),
            }
            .into()),
        }
    }

    /// Completes a pending request. Responses from another session are ignored.
    pub fn resolve(&self, session_id: &str, tool_call_id: &str, output: Value) -> bool {
        let Some((_, request)) = self
            .pending
            .remove(&PendingKey::new(session_id, tool_call_id))
        else {
            return false;
        };
        debug!(session_id = %session_id, call_id = %tool_call_id, "client tool call resolved");
        request.sender.send(Ok(output)).is_ok()
    }

    /// Rejects every pending request of the session. Returns how many were pending.
    pub fn disconnect(&self, session_id: &str) -> usize {
        let keys: Vec<PendingKey> = self
            .pending
            .iter()
            .filter(|entry| entry.key().session_id == session_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut rejected = 0;
        for key in keys {
            if let Some((key, request)) = self.pending.remove(&key) {
                let _ = request.sender.send(Err(ToolError::ClientDisconnected {
                    tool_call_id: key.tool_call_id,
                }));
                rejected += 1;
            }
        }
        if rejected > 0 {
            info!(session_id = %session_id, rejected, "rejected pending client tool calls");
        }
        rejected
    }
}
