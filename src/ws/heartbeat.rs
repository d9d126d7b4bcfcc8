use axum::extract::ws::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::connection::{Connection, CLOSE_GONE_AWAY};

/// Per-connection liveness probe loop.
///
/// Each tick: a connection that never answered the previous probe is
/// terminated; otherwise its flag is cleared and a new ping goes out. The
/// read loop re-arms the flag when the peer's pong arrives, so a silent
/// peer is reaped within two intervals. A probe that cannot even be queued
/// terminates the connection immediately.
pub async fn run(connection: Arc<Connection>, period: Duration) {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        if connection.is_closed() {
            break;
        }

        if !connection.is_alive() {
            info!(
                "Connection {} (user {}) missed its heartbeat window, terminating",
                connection.id, connection.user_id
            );
            connection.close_with(CLOSE_GONE_AWAY, "heartbeat timeout");
            break;
        }

        connection.set_alive(false);
        if connection.send(Message::Ping(Vec::new())).is_err() {
            info!(
                "Heartbeat probe failed for connection {} (user {}), terminating",
                connection.id, connection.user_id
            );
            connection.mark_closed();
            break;
        }
        debug!("Heartbeat probe sent to connection {}", connection.id);
    }
}
