use axum::extract::ws::{close_code, CloseFrame, Message};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound frames queued per connection before the writer task drains them.
/// A peer that stops reading loses messages once the queue fills; delivery is
/// best-effort by contract.
pub const OUTBOUND_QUEUE: usize = 256;

/// One authenticated, live socket.
///
/// `user_id` is fixed at the handshake. `document_id` is written at most once
/// by the binding state machine. `is_alive` is cleared by the liveness
/// monitor and re-armed by the read loop when a pong arrives. `closed` is
/// terminal: once set, the connection is removed from the room registry and
/// accepts no further sends.
pub struct Connection {
    pub id: Uuid,
    pub user_id: String,
    document_id: OnceLock<String>,
    is_alive: AtomicBool,
    closed: AtomicBool,
    outbound: mpsc::Sender<Message>,
}

#[derive(Debug)]
pub enum SendError {
    /// The connection reached its terminal state.
    Closed,
    /// The outbound queue is full; the frame is dropped.
    QueueFull,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Closed => write!(f, "connection closed"),
            SendError::QueueFull => write!(f, "outbound queue full"),
        }
    }
}

impl std::error::Error for SendError {}

impl Connection {
    pub fn new(user_id: String, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            document_id: OnceLock::new(),
            is_alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            outbound,
        }
    }

    /// The document this connection is bound to, if any.
    pub fn document_id(&self) -> Option<&str> {
        self.document_id.get().map(|s| s.as_str())
    }

    /// Record the one-time document binding. Returns false if a binding
    /// already existed (it is never overwritten).
    pub fn bind_document(&self, document_id: &str) -> bool {
        self.document_id.set(document_id.to_string()).is_ok()
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::SeqCst)
    }

    pub fn set_alive(&self, alive: bool) {
        self.is_alive.store(alive, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn send(&self, msg: Message) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.outbound.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
        })
    }

    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        self.send(Message::Text(text))
    }

    /// Queue a close frame and flip the terminal flag. Safe to call more than
    /// once; only the first close frame is sent.
    pub fn close_with(&self, code: u16, reason: &'static str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = self.outbound.try_send(Message::Close(Some(frame)));
    }

    /// Mark closed without sending a close frame (transport already gone).
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Close code for a denied document bind. Distinct from internal-error
/// closes so the peer can tell policy from failure.
pub const CLOSE_POLICY_VIOLATION: u16 = close_code::POLICY;

/// Close code for unexpected faults during connection setup.
pub const CLOSE_INTERNAL_ERROR: u16 = close_code::ERROR;

/// Close code for connections reaped by the liveness monitor.
pub const CLOSE_GONE_AWAY: u16 = close_code::AWAY;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_connection() -> (Connection, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        (Connection::new("u1".to_string(), tx), rx)
    }

    #[test]
    fn document_binding_is_write_once() {
        let (conn, _rx) = test_connection();
        assert_eq!(conn.document_id(), None);
        assert!(conn.bind_document("doc1"));
        assert!(!conn.bind_document("doc2"));
        assert_eq!(conn.document_id(), Some("doc1"));
    }

    #[test]
    fn send_after_close_is_rejected() {
        let (conn, mut rx) = test_connection();
        conn.close_with(CLOSE_POLICY_VIOLATION, "document access denied");
        assert!(matches!(conn.send_text("late".to_string()), Err(SendError::Closed)));

        // The close frame is the only queued message
        match rx.try_recv() {
            Ok(Message::Close(Some(frame))) => assert_eq!(frame.code, CLOSE_POLICY_VIOLATION),
            other => panic!("Expected close frame, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let (conn, mut rx) = test_connection();
        conn.close_with(CLOSE_GONE_AWAY, "heartbeat timeout");
        conn.close_with(CLOSE_INTERNAL_ERROR, "setup failed");

        assert!(matches!(rx.try_recv(), Ok(Message::Close(_))));
        assert!(rx.try_recv().is_err());
    }
}
