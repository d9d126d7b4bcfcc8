
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A content edit to persist and fan out.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub document_id: String,
    pub user_id: String,
    pub data: Value,
}

/// A cursor position change. Transient, never persisted.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CursorMessage {
    pub document_id: String,
    pub user_id: String,
    pub data: Value,
}

/// A presence change (joined, idle, ...). Transient, never persisted.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PresenceMessage {
    pub document_id: String,
    pub user_id: String,
    pub data: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "update")]
    Update(UpdateMessage),
    #[serde(rename = "cursor")]
    Cursor(CursorMessage),
    #[serde(rename = "presence")]
    Presence(PresenceMessage),
}

impl ClientMessage {
    /// Document the envelope addresses.
    pub fn document_id(&self) -> &str {
        match self {
            ClientMessage::Update(m) => &m.document_id,
            ClientMessage::Cursor(m) => &m.document_id,
            ClientMessage::Presence(m) => &m.document_id,
        }
    }
}

/// Handshake acknowledgement, sent exactly once per accepted connection.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub user_id: String,
    pub document_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "connected")]
    Connected(ConnectedMessage),
}

/// In-band failure reply. Always addressed to the sender only and always
/// retry-able from the client's point of view.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorMessage {
    pub error: String,
}

impl ErrorMessage {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
