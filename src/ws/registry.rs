//! Registry of live WebSocket sessions, used for replies and one-off events

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::game::entity::ConnId;
use crate::ws::protocol::ServerMsg;

pub struct ConnectionRegistry {
    connections: DashMap<ConnId, mpsc::UnboundedSender<ServerMsg>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection, returns the receiver for its direct messages
    pub fn register(&self, conn_id: ConnId) -> mpsc::UnboundedReceiver<ServerMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(conn_id, tx);
        rx
    }

    pub fn unregister(&self, conn_id: &ConnId) {
        self.connections.remove(conn_id);
    }

    /// Deliver a message to one connection. Unknown or closed connections are skipped.
    pub fn send(&self, conn_id: &ConnId, msg: ServerMsg) {
        let delivered = self
            .connections
            .get(conn_id)
            .map(|tx| tx.send(msg).is_ok())
            .unwrap_or(false);
        if !delivered {
            debug!(conn_id = %conn_id, "Dropped message for closed connection");
        }
    }

    /// Deliver a message to every live connection. Unlike the snapshot
    /// broadcast this never drops a message for a slow reader.
    pub fn send_all(&self, msg: ServerMsg) {
        for entry in self.connections.iter() {
            if entry.value().send(msg.clone()).is_err() {
                debug!(conn_id = %entry.key(), "Dropped event for closed connection");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_direct_delivery() {
        let registry = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = registry.register(a);
        let mut rx_b = registry.register(b);
        assert_eq!(registry.len(), 2);

        registry.send(
            &a,
            ServerMsg::Error {
                code: "GAME_NOT_PAUSED".to_string(),
                message: "Game is not paused".to_string(),
            },
        );

        assert!(matches!(rx_a.try_recv(), Ok(ServerMsg::Error { .. })));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_send_after_unregister_is_dropped() {
        let registry = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        let _rx = registry.register(a);
        registry.unregister(&a);
        assert!(registry.is_empty());

        registry.send(&a, ServerMsg::GameStarted {});
    }

    #[test]
    fn test_send_all_reaches_every_connection() {
        let registry = ConnectionRegistry::new();
        let mut rx_a = registry.register(Uuid::new_v4());
        let mut rx_b = registry.register(Uuid::new_v4());
        let gone = Uuid::new_v4();
        drop(registry.register(gone));

        registry.send_all(ServerMsg::GameStarted {});

        assert!(matches!(rx_a.try_recv(), Ok(ServerMsg::GameStarted {})));
        assert!(matches!(rx_b.try_recv(), Ok(ServerMsg::GameStarted {})));
        assert!(rx_a.try_recv().is_err());
    }
}
