use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::connection::Connection;

/// Concurrency-safe mapping from document id to the set of live connections
/// bound to it.
///
/// Owned by `AppState` and injected wherever needed — never a module-level
/// singleton, so each test scenario can run against its own registry. None
/// of the operations can fail; they are pure bookkeeping. No caller holds
/// the lock across an await point: broadcasts iterate a snapshot.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Vec<Arc<Connection>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection to the room for `document_id`, creating the room if
    /// this is its first member.
    pub async fn bind(&self, document_id: &str, connection: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(document_id.to_string())
            .or_default()
            .push(connection);
    }

    /// Remove a connection from its room. No-op for unbound connections.
    /// The room entry is reclaimed once its last member leaves.
    pub async fn unbind(&self, connection: &Connection) {
        let Some(document_id) = connection.document_id() else {
            return;
        };

        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(document_id) {
            members.retain(|member| member.id != connection.id);
            if members.is_empty() {
                rooms.remove(document_id);
                info!("Room for document {} is empty, reclaimed", document_id);
            }
        }
    }

    /// Snapshot of the live connections bound to `document_id`, minus the
    /// excluded sender. Later mutation of the room does not affect the
    /// returned list.
    pub async fn broadcast_targets(&self, document_id: &str, excluding: Uuid) -> Vec<Arc<Connection>> {
        let rooms = self.rooms.read().await;
        match rooms.get(document_id) {
            Some(members) => members
                .iter()
                .filter(|member| member.id != excluding && !member.is_closed())
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Number of registered connections across all rooms.
    pub async fn connection_count(&self) -> usize {
        self.rooms.read().await.values().map(|members| members.len()).sum()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::OUTBOUND_QUEUE;
    use tokio::sync::mpsc;

    fn bound_connection(user_id: &str, document_id: &str) -> Arc<Connection> {
        let (tx, _rx) = mpsc::channel(OUTBOUND_QUEUE);
        // Receiver is dropped; these tests only exercise bookkeeping.
        let conn = Connection::new(user_id.to_string(), tx);
        conn.bind_document(document_id);
        Arc::new(conn)
    }

    #[tokio::test]
    async fn bind_creates_room_and_unbind_reclaims_it() {
        let registry = RoomRegistry::new();
        let conn = bound_connection("u1", "doc1");

        registry.bind("doc1", conn.clone()).await;
        assert_eq!(registry.room_count().await, 1);
        assert_eq!(registry.connection_count().await, 1);

        registry.unbind(&conn).await;
        assert_eq!(registry.room_count().await, 0);
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn unbind_of_unbound_connection_is_a_noop() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::channel(OUTBOUND_QUEUE);
        let conn = Connection::new("u1".to_string(), tx);

        registry.unbind(&conn).await;
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn unbind_keeps_room_while_other_members_remain() {
        let registry = RoomRegistry::new();
        let a = bound_connection("u1", "doc1");
        let b = bound_connection("u2", "doc1");
        registry.bind("doc1", a.clone()).await;
        registry.bind("doc1", b.clone()).await;

        registry.unbind(&a).await;
        assert_eq!(registry.room_count().await, 1);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn broadcast_targets_excludes_sender_and_closed_connections() {
        let registry = RoomRegistry::new();
        let a = bound_connection("u1", "doc1");
        let b = bound_connection("u2", "doc1");
        let c = bound_connection("u3", "doc1");
        registry.bind("doc1", a.clone()).await;
        registry.bind("doc1", b.clone()).await;
        registry.bind("doc1", c.clone()).await;

        c.mark_closed();

        let targets = registry.broadcast_targets("doc1", a.id).await;
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, b.id);
    }

    #[tokio::test]
    async fn broadcast_targets_is_a_snapshot() {
        let registry = RoomRegistry::new();
        let a = bound_connection("u1", "doc1");
        let b = bound_connection("u2", "doc1");
        registry.bind("doc1", a.clone()).await;
        registry.bind("doc1", b.clone()).await;

        let targets = registry.broadcast_targets("doc1", a.id).await;

        // Membership changes after the snapshot do not affect it
        registry.unbind(&b).await;
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, b.id);
    }

    #[tokio::test]
    async fn rooms_are_independent() {
        let registry = RoomRegistry::new();
        let a = bound_connection("u1", "doc1");
        let b = bound_connection("u2", "doc2");
        registry.bind("doc1", a.clone()).await;
        registry.bind("doc2", b.clone()).await;

        assert_eq!(registry.room_count().await, 2);
        assert!(registry.broadcast_targets("doc1", b.id).await.len() == 1);
        assert!(registry.broadcast_targets("doc2", a.id).await.len() == 1);
    }
}
