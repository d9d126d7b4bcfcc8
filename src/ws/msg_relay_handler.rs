use std::sync::Arc;
use tracing::debug;

use crate::models::{CursorMessage, PresenceMessage};
use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_room;
use crate::ws::connection::Connection;

/// Handle CursorMessage
///
/// Cursor positions are transient: no persistence, immediate best-effort
/// relay to the rest of the room.
pub async fn handle_cursor_message(
    app_state: &AppState,
    connection: &Arc<Connection>,
    cursor_msg: &CursorMessage,
    frame: &str,
) {
    debug!(
        "Cursor message received for document {}: user={}",
        cursor_msg.document_id, connection.user_id
    );

    broadcast_to_room(
        &app_state.registry,
        &cursor_msg.document_id,
        connection.id,
        frame,
    )
    .await;
}

/// Handle PresenceMessage
///
/// Same transient relay as cursors.
pub async fn handle_presence_message(
    app_state: &AppState,
    connection: &Arc<Connection>,
    presence_msg: &PresenceMessage,
    frame: &str,
) {
    debug!(
        "Presence message received for document {}: user={}",
        presence_msg.document_id, connection.user_id
    );

    broadcast_to_room(
        &app_state.registry,
        &presence_msg.document_id,
        connection.id,
        frame,
    )
    .await;
}
