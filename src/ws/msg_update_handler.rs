use std::sync::Arc;
use tracing::{error, info};

use crate::models::UpdateMessage;
use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_room;
use crate::ws::connection::Connection;
use crate::ws::dispatch::reply_error;

/// Handle UpdateMessage
///
/// Persistence comes first: peers must never observe a state the store
/// rejected. Only after the atomic content-overwrite + version-append
/// commits does the envelope fan out to the rest of the room.
pub async fn handle_update_message(
    app_state: &AppState,
    connection: &Arc<Connection>,
    update_msg: &UpdateMessage,
    frame: &str,
) {
    info!(
        "Update message received for document {}: user={}",
        update_msg.document_id, connection.user_id
    );

    // The change is attributed to the authenticated user, not whatever the
    // envelope claims.
    if let Err(e) = app_state
        .store
        .apply_update(&update_msg.document_id, &connection.user_id, &update_msg.data)
        .await
    {
        error!(
            "Failed to persist update for document {}: {}",
            update_msg.document_id, e
        );
        reply_error(connection, "failed to save update");
        return;
    }

    broadcast_to_room(
        &app_state.registry,
        &update_msg.document_id,
        connection.id,
        frame,
    )
    .await;
}
