use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{ClientMessage, ErrorMessage};
use crate::services::access_service;
use crate::state::AppState;
use crate::ws::connection::Connection;
use crate::ws::{msg_relay_handler, msg_update_handler};

/// Why a document bind was refused.
#[derive(Debug)]
pub enum BindError {
    /// The authenticated user is not a member of the document.
    Denied,
    /// The membership check itself failed (store unreachable, bad id).
    CheckFailed,
}

/// Send an in-band error reply to this connection only. Failures to deliver
/// the reply are not themselves errors; the connection is on its way out.
pub fn reply_error(connection: &Connection, message: &str) {
    let reply = ErrorMessage::new(message);
    let payload = serde_json::to_string(&reply).unwrap();
    if connection.send_text(payload).is_err() {
        debug!(
            "Could not deliver error reply to connection {}: {}",
            connection.id, message
        );
    }
}

/// The `unbound -> bound` transition: membership check, then registry entry
/// plus the write-once document id on the connection. Used by the eager
/// handshake bind and by the first in-band message of an unbound connection.
pub async fn bind_connection(
    app_state: &AppState,
    connection: &Arc<Connection>,
    document_id: &str,
) -> Result<(), BindError> {
    let member = match access_service::check_membership(
        &app_state.membership,
        app_state.store.as_ref(),
        document_id,
        &connection.user_id,
    )
    .await
    {
        Ok(member) => member,
        Err(e) => {
            warn!(
                "Membership check failed for user {} on document {}: {}",
                connection.user_id, document_id, e
            );
            return Err(BindError::CheckFailed);
        }
    };

    if !member {
        info!(
            "User {} denied access to document {}",
            connection.user_id, document_id
        );
        return Err(BindError::Denied);
    }

    if connection.bind_document(document_id) {
        app_state.registry.bind(document_id, connection.clone()).await;
        info!(
            "Connection {} (user {}) bound to document {}",
            connection.id, connection.user_id, document_id
        );
    }
    Ok(())
}

/// Handle one inbound text frame: parse, enforce the binding invariant,
/// route by tag. Every failure is answered to the sender only; the
/// connection stays open throughout.
pub async fn handle_frame(app_state: &AppState, connection: &Arc<Connection>, frame: &str) {
    // 1. Parse the envelope. Distinguish garbage from a well-formed message
    // carrying a tag this protocol does not know.
    let value: serde_json::Value = match serde_json::from_str(frame) {
        Ok(value) => value,
        Err(e) => {
            warn!("Unparseable frame from connection {}: {}", connection.id, e);
            reply_error(connection, "invalid message format");
            return;
        }
    };

    let tag = value
        .get("type")
        .and_then(|t| t.as_str())
        .map(|t| t.to_string());

    let message: ClientMessage = match tag.as_deref() {
        Some("update") | Some("cursor") | Some("presence") => {
            match serde_json::from_value(value) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Malformed message from connection {}: {}", connection.id, e);
                    reply_error(connection, "invalid message format");
                    return;
                }
            }
        }
        Some(other) => {
            warn!(
                "Unknown message type '{}' from connection {}",
                other, connection.id
            );
            reply_error(connection, "unknown message type");
            return;
        }
        None => {
            reply_error(connection, "invalid message format");
            return;
        }
    };

    // 2. Enforce the documentId invariant, binding first if needed.
    match connection.document_id() {
        Some(bound) if bound != message.document_id() => {
            warn!(
                "Connection {} sent a message for document {} while bound to {}",
                connection.id,
                message.document_id(),
                bound
            );
            reply_error(connection, "document mismatch");
            return;
        }
        Some(_) => {}
        None => match bind_connection(app_state, connection, message.document_id()).await {
            Ok(()) => {}
            Err(BindError::Denied) => {
                reply_error(connection, "document access denied");
                return;
            }
            Err(BindError::CheckFailed) => {
                reply_error(connection, "document access check failed");
                return;
            }
        },
    }

    // 3. Route by tag. The raw frame travels along so fan-out forwards the
    // envelope exactly as the sender produced it.
    match message {
        ClientMessage::Update(update) => {
            msg_update_handler::handle_update_message(app_state, connection, &update, frame).await;
        }
        ClientMessage::Cursor(cursor) => {
            msg_relay_handler::handle_cursor_message(app_state, connection, &cursor, frame).await;
        }
        ClientMessage::Presence(presence) => {
            msg_relay_handler::handle_presence_message(app_state, connection, &presence, frame).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::auth_client::{AuthError, AuthGateway, AuthenticatedUser};
    use crate::config::Config;
    use crate::db::docstore::{DocumentStore, StoreError};
    use async_trait::async_trait;
    use axum::extract::ws::Message;
    use serde_json::Value;
    use tokio::sync::mpsc;

    struct NoAuth;

    #[async_trait]
    impl AuthGateway for NoAuth {
        async fn validate(&self, _token: &str) -> Result<AuthenticatedUser, AuthError> {
            Err(AuthError::Unauthorized)
        }
    }

    /// Everyone is a member, every update persists.
    struct OpenStore;

    #[async_trait]
    impl DocumentStore for OpenStore {
        async fn is_member(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Ok(true)
        }

        async fn apply_update(&self, _: &str, _: &str, _: &Value) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn test_state() -> AppState {
        AppState::new(Config::default(), Arc::new(NoAuth), Arc::new(OpenStore))
    }

    fn test_connection() -> (Arc<Connection>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(Connection::new("U1".to_string(), tx)), rx)
    }

    fn expect_error(rx: &mut mpsc::Receiver<Message>, expected: &str) {
        match rx.try_recv() {
            Ok(Message::Text(text)) => {
                let value: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["error"], expected);
            }
            other => panic!("Expected an error reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn garbage_frame_is_invalid_format() {
        let state = test_state();
        let (conn, mut rx) = test_connection();

        handle_frame(&state, &conn, "{{{ not json").await;
        expect_error(&mut rx, "invalid message format");
    }

    #[tokio::test]
    async fn known_tag_with_missing_fields_is_invalid_format() {
        let state = test_state();
        let (conn, mut rx) = test_connection();

        handle_frame(&state, &conn, r#"{"type":"update"}"#).await;
        expect_error(&mut rx, "invalid message format");
    }

    #[tokio::test]
    async fn unknown_tag_is_reported_distinctly() {
        let state = test_state();
        let (conn, mut rx) = test_connection();

        let frame = r#"{"type":"subscribe","documentId":"d1","userId":"U1","data":{}}"#;
        handle_frame(&state, &conn, frame).await;
        expect_error(&mut rx, "unknown message type");
    }

    #[tokio::test]
    async fn first_valid_message_binds_the_connection() {
        let state = test_state();
        let (conn, mut rx) = test_connection();

        let frame = r#"{"type":"cursor","documentId":"d1","userId":"U1","data":{}}"#;
        handle_frame(&state, &conn, frame).await;

        assert_eq!(conn.document_id(), Some("d1"));
        assert_eq!(state.registry.connection_count().await, 1);
        // Success produces no reply to the sender
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bound_connection_rejects_other_documents() {
        let state = test_state();
        let (conn, mut rx) = test_connection();

        let first = r#"{"type":"cursor","documentId":"d1","userId":"U1","data":{}}"#;
        handle_frame(&state, &conn, first).await;

        let astray = r#"{"type":"update","documentId":"d2","userId":"U1","data":{}}"#;
        handle_frame(&state, &conn, astray).await;

        expect_error(&mut rx, "document mismatch");
        assert_eq!(conn.document_id(), Some("d1"));
        assert_eq!(state.registry.connection_count().await, 1);
    }
}
