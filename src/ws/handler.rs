
use std::sync::Arc;
use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::{ConnectedMessage, ErrorResponse, SendMessage};
use crate::state::AppState;
use crate::ws::connection::{
    Connection, CLOSE_INTERNAL_ERROR, CLOSE_POLICY_VIOLATION, OUTBOUND_QUEUE,
};
use crate::ws::dispatch::{self, BindError};
use crate::ws::heartbeat;

/// Query parameters of the upgrade request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub token: Option<String>,
    pub document_id: Option<String>,
}

fn reject(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// WebSocket handler
///
/// The gate runs before the upgrade: a request that is not an upgrade, has
/// no token, or fails authentication never becomes a Connection. Auth
/// failures of every kind collapse to 401; the peer learns nothing about
/// why.
pub async fn ws_handler(
    ws: Option<WebSocketUpgrade>,
    Query(params): Query<WsQuery>,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    let Some(ws) = ws else {
        return reject(StatusCode::BAD_REQUEST, "Expected WebSocket upgrade request");
    };

    let Some(token) = params.token else {
        return reject(StatusCode::UNAUTHORIZED, "Missing token");
    };

    let user = match app_state.auth.validate(&token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("WebSocket handshake authentication failed: {}", e);
            return reject(StatusCode::UNAUTHORIZED, "Authentication failed");
        }
    };

    info!("New WebSocket connection attempt by user {}", user.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, user.user_id, params.document_id, app_state))
}

/// Handle WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    user_id: String,
    eager_document_id: Option<String>,
    app_state: Arc<AppState>,
) {
    // Split the socket; the write half gets a single owner task and everyone
    // else queues frames through the connection's outbound channel.
    let (mut sink, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    let connection = Arc::new(Connection::new(user_id, outbound_tx));

    info!(
        "WebSocket connection established for user {} with connection_id: {}",
        connection.user_id, connection.id
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || is_close {
                break;
            }
        }
    });

    // Eager bind when the handshake named a document. Denial closes the
    // now-live connection with the policy-violation code - an authenticated
    // but unbindable connection is not left open.
    if let Some(document_id) = eager_document_id {
        if let Err(e) = dispatch::bind_connection(&app_state, &connection, &document_id).await {
            match e {
                BindError::Denied => {
                    dispatch::reply_error(&connection, "document access denied");
                    connection.close_with(CLOSE_POLICY_VIOLATION, "document access denied");
                }
                BindError::CheckFailed => {
                    dispatch::reply_error(&connection, "document access check failed");
                    connection.close_with(CLOSE_INTERNAL_ERROR, "internal error");
                }
            }
            // The writer drains the error and close frames, then exits.
            let _ = send_task.await;
            info!(
                "WebSocket connection for user {} rejected at document bind",
                connection.user_id
            );
            return;
        }
    }

    // Exactly one connected acknowledgement per accepted connection.
    let ack = SendMessage::Connected(ConnectedMessage {
        user_id: connection.user_id.clone(),
        document_id: connection.document_id().map(|d| d.to_string()),
    });
    if connection.send_text(serde_json::to_string(&ack).unwrap()).is_err() {
        warn!(
            "Failed to queue connected ack for connection {}, giving up",
            connection.id
        );
        send_task.abort();
        return;
    }

    // Liveness monitor and read loop run as a task pair; whichever finishes
    // first tears the other down.
    let hb_connection = Arc::clone(&connection);
    let period = app_state.config.heartbeat_interval();
    let mut hb_task = tokio::spawn(async move {
        heartbeat::run(hb_connection, period).await;
    });

    let read_connection = Arc::clone(&connection);
    let read_state = Arc::clone(&app_state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    dispatch::handle_frame(&read_state, &read_connection, &text).await;
                }
                Message::Pong(_) => read_connection.set_alive(true),
                Message::Binary(_) => {
                    dispatch::reply_error(&read_connection, "invalid message format");
                }
                Message::Ping(_) => {} // the transport answers pings itself
                Message::Close(_) => break,
            }
        }
    });

    tokio::select! {
        _ = (&mut recv_task) => hb_task.abort(),
        _ = (&mut hb_task) => recv_task.abort(),
    };

    // Terminal cleanup: the connection receives no further messages and no
    // residual room entry may remain.
    connection.mark_closed();
    app_state.registry.unbind(&connection).await;
    info!(
        "WebSocket connection terminated for user {} ({})",
        connection.user_id, connection.id
    );

    // Let the writer flush a queued close frame before it is stopped.
    let _ = tokio::time::timeout(std::time::Duration::from_millis(100), &mut send_task).await;
    send_task.abort();
}
