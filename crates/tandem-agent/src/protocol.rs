//! Wire messages exchanged with a connected client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Identify {
        txid: u64,
        client_session_id: String,
    },
    Subscribe {
        txid: u64,
        topics: Vec<String>,
    },
    Unsubscribe {
        txid: u64,
        topics: Vec<String>,
    },
    Ping {
        txid: u64,
    },
    Action {
        txid: u64,
        data: ClientAction,
    },
}

impl ClientMessage {
    pub fn txid(&self) -> u64 {
        match self {
            Self::Identify { txid, .. }
            | Self::Subscribe { txid, .. }
            | Self::Unsubscribe { txid, .. }
            | Self::Ping { txid }
            | Self::Action { txid, .. } => *txid,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientAction {
    #[serde(rename_all = "camelCase")]
    ToolCallResponse { tool_call_id: String, output: Value },
    #[serde(rename_all = "camelCase")]
    CancelUserInput { prompt_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        txid: Option<u64>,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Action {
        data: ServerAction,
    },
}

impl ServerMessage {
    pub fn ack(txid: u64) -> Self {
        Self::Ack {
            txid: Some(txid),
            success: true,
            error: None,
        }
    }

    pub fn nack(txid: Option<u64>, error: impl Into<String>) -> Self {
        Self::Ack {
            txid,
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerAction {
    #[serde(rename_all = "camelCase")]
    ToolCallRequest {
        user_input_id: String,
        tool_call_id: String,
        tool_name: String,
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
}
