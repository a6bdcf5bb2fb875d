//! Connected client sessions and the per-connection message handler.

use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{ClientAction, ClientMessage, ServerMessage};
use crate::ClientBridge;

const DEFAULT_SEND_QUEUE: usize = 256;

struct SessionRecord {
    sender: mpsc::Sender<ServerMessage>,
    client_session_id: Option<String>,
    topics: BTreeSet<String>,
    /// User input id to the token cancelling runs steered by it.
    live_inputs: HashMap<String, CancellationToken>,
    cancel: CancellationToken,
}

/// Identity and cancellation scope of one agent run.
#[derive(Clone, Debug)]
pub struct RunScope {
    pub session_id: String,
    pub user_input_id: String,
    pub cancel: CancellationToken,
    pub depth: usize,
}

impl RunScope {
    /// A scope tied to no session. Client tools fail with a disconnect error.
    pub fn detached(user_input_id: impl Into<String>) -> Self {
        Self {
            session_id: String::new(),
            user_input_id: user_input_id.into(),
            cancel: CancellationToken::new(),
            depth: 0,
        }
    }

    /// Scope for a spawned child. Cancelling the parent cancels the child.
    pub fn child(&self) -> Self {
        Self {
            session_id: self.session_id.clone(),
            user_input_id: self.user_input_id.clone(),
            cancel: self.cancel.child_token(),
            depth: self.depth + 1,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub struct SessionRegistry {
    sessions: DashMap<String, SessionRecord>,
    max_send_queue: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_QUEUE)
    }
}

impl SessionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_send_queue,
        }
    }

    /// Attaches a connection and returns the receiving half of its outbound queue.
    pub fn attach(&self, session_id: impl Into<String>) -> mpsc::Receiver<ServerMessage> {
        let session_id = session_id.into();
        let (sender, receiver) = mpsc::channel(self.max_send_queue);
        let record = SessionRecord {
            sender,
            client_session_id: None,
            topics: BTreeSet::new(),
            live_inputs: HashMap::new(),
            cancel: CancellationToken::new(),
        };
        if let Some(previous) = self.sessions.insert(session_id.clone(), record) {
            previous.cancel.cancel();
        }
        info!(session_id = %session_id, "client session attached");
        receiver
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|record| !record.sender.is_closed())
    }

    pub fn identify(&self, session_id: &str, client_session_id: impl Into<String>) -> bool {
        let Some(mut record) = self.sessions.get_mut(session_id) else {
            return false;
        };
        record.client_session_id = Some(client_session_id.into());
        true
    }

    pub fn is_identified(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|record| record.client_session_id.is_some())
    }

    pub fn subscribe(&self, session_id: &str, topics: &[String]) {
        if let Some(mut record) = self.sessions.get_mut(session_id) {
            record.topics.extend(topics.iter().cloned());
        }
    }

    pub fn unsubscribe(&self, session_id: &str, topics: &[String]) {
        if let Some(mut record) = self.sessions.get_mut(session_id) {
            for topic in topics {
                record.topics.remove(topic);
            }
        }
    }

    pub fn topics(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .get(session_id)
            .map(|record| record.topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Queues a message for the client. Returns false when it could not be queued.
    pub fn send(&self, session_id: &str, message: ServerMessage) -> bool {
        let Some(sender) = self
            .sessions
            .get(session_id)
            .map(|record| record.sender.clone())
        else {
            return false;
        };
        match sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session_id = %session_id, "send queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Marks a user input live and returns the scope for the run it starts.
    pub fn start_run(&self, session_id: &str, user_input_id: impl Into<String>) -> RunScope {
        let user_input_id = user_input_id.into();
        let cancel = match self.sessions.get_mut(session_id) {
            Some(mut record) => {
                let token = record.cancel.child_token();
                record
                    .live_inputs
                    .insert(user_input_id.clone(), token.clone());
                token
            }
            None => {
                debug!(session_id = %session_id, "starting run without a connected session");
                CancellationToken::new()
            }
        };
        RunScope {
            session_id: session_id.to_string(),
            user_input_id,
            cancel,
            depth: 0,
        }
    }

    pub fn is_user_input_live(&self, session_id: &str, user_input_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|record| record.live_inputs.contains_key(user_input_id))
    }

    /// Cancels every run steered by this user input.
    pub fn cancel_user_input(&self, session_id: &str, user_input_id: &str) -> bool {
        let token = self
            .sessions
            .get_mut(session_id)
            .and_then(|mut record| record.live_inputs.remove(user_input_id));
        match token {
            Some(token) => {
                info!(session_id = %session_id, user_input_id = %user_input_id, "user input cancelled");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forgets a finished user input without cancelling anything.
    pub fn finish_user_input(&self, session_id: &str, user_input_id: &str) {
        if let Some(mut record) = self.sessions.get_mut(session_id) {
            record.live_inputs.remove(user_input_id);
        }
    }

    /// Drops the session and cancels everything scoped to it.
    pub fn close_session(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, record)) => {
                record.cancel.cancel();
                info!(
                    session_id = %session_id,
                    live_inputs = record.live_inputs.len(),
                    "client session closed"
                );
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Handles frames from one client connection.
pub struct ConnectionHandler {
    session_id: String,
    sessions: Arc<SessionRegistry>,
    bridge: Arc<ClientBridge>,
}

impl ConnectionHandler {
    pub fn new(
        session_id: impl Into<String>,
        sessions: Arc<SessionRegistry>,
        bridge: Arc<ClientBridge>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            sessions,
            bridge,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn handle_text(&self, frame: &str) -> Vec<ServerMessage> {
        match serde_json::from_str::<ClientMessage>(frame) {
            Ok(message) => self.handle_message(message),
            Err(error) => {
                debug!(session_id = %self.session_id, error = %error, "malformed client frame");
                vec![ServerMessage::nack(None, format!("malformed message: {error}"))]
            }
        }
    }

    pub fn handle_message(&self, message: ClientMessage) -> Vec<ServerMessage> {
        match message {
            ClientMessage::Identify {
                txid,
                client_session_id,
            } => {
                if self.sessions.identify(&self.session_id, client_session_id) {
                    vec![ServerMessage::ack(txid)]
                } else {
                    vec![ServerMessage::nack(Some(txid), "session not attached")]
                }
            }
            ClientMessage::Subscribe { txid, topics } => {
                self.sessions.subscribe(&self.session_id, &topics);
                vec![ServerMessage::ack(txid)]
            }
            ClientMessage::Unsubscribe { txid, topics } => {
                self.sessions.unsubscribe(&self.session_id, &topics);
                vec![ServerMessage::ack(txid)]
            }
            ClientMessage::Ping { txid } => vec![ServerMessage::ack(txid)],
            ClientMessage::Action { txid, data } => {
                if !self.sessions.is_identified(&self.session_id) {
                    return vec![ServerMessage::nack(Some(txid), "not identified")];
                }
                vec![self.handle_action(txid, data)]
            }
        }
    }

    fn handle_action(&self, txid: u64, action: ClientAction) -> ServerMessage {
        match action {
            ClientAction::ToolCallResponse {
                tool_call_id,
                output,
            } => {
                if self.bridge.resolve(&self.session_id, &tool_call_id, output) {
                    ServerMessage::ack(txid)
                } else {
                    ServerMessage::nack(
                        Some(txid),
                        format!("no pending tool call with id {tool_call_id}"),
                    )
                }
            }
            ClientAction::CancelUserInput { prompt_id } => {
                self.sessions
                    .cancel_user_input(&self.session_id, &prompt_id);
                ServerMessage::ack(txid)
            }
        }
    }

    /// Tears the session down: pending client tool calls are rejected as
    /// disconnected, then every run scoped to the session is cancelled.
    pub fn close(self) {
        let rejected = self.bridge.disconnect(&self.session_id);
        self.sessions.close_session(&self.session_id);
        info!(session_id = %self.session_id, rejected, "connection closed");
    }
}
