//! Connection registry for the realtime hub.
//!
//! Maps live connections to their outbound event channels. Each WebSocket
//! connection owns a writer task that drains its channel and encodes events
//! to binary frames; handlers only ever see [`ServerEvent`] values, never
//! transport frames. Entries are ephemeral — lost on process restart, same
//! as presence and room membership.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use pulse_proto::event::ServerEvent;
use pulse_proto::ids::UserId;
use tokio::sync::{RwLock, mpsc};

/// Process-local handle for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A registered connection: the owning user and its outbound channel.
struct Connection {
    user_id: UserId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Registry of live connections and their outbound event channels.
///
/// Thread-safe via [`RwLock`]. Sends are fire-and-forget: a closed channel
/// means the writer task is already tearing down, which the disconnect path
/// cleans up.
pub struct Hub {
    next_id: AtomicU64,
    connections: RwLock<HashMap<ConnId, Connection>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    /// Creates a new, empty connection registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a connection for `user_id`, returning its fresh handle.
    pub async fn connect(
        &self,
        user_id: UserId,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnId {
        let conn = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut conns = self.connections.write().await;
        conns.insert(conn, Connection { user_id, tx });
        drop(conns);
        conn
    }

    /// Removes a connection, returning its owning user if it was registered.
    pub async fn disconnect(&self, conn: ConnId) -> Option<UserId> {
        let mut conns = self.connections.write().await;
        conns.remove(&conn).map(|c| c.user_id)
    }

    /// Returns the user that owns a connection, if registered.
    pub async fn user_of(&self, conn: ConnId) -> Option<UserId> {
        let conns = self.connections.read().await;
        conns.get(&conn).map(|c| c.user_id.clone())
    }

    /// Sends one event to one connection. Fire-and-forget: a closed channel
    /// is logged and ignored.
    pub async fn send(&self, conn: ConnId, event: ServerEvent) {
        let conns = self.connections.read().await;
        if let Some(connection) = conns.get(&conn) {
            if connection.tx.send(event).is_err() {
                tracing::debug!(conn = %conn, "outbound channel closed, dropping event");
            }
        } else {
            tracing::debug!(conn = %conn, "send to unknown connection dropped");
        }
    }

    /// Sends a clone of `event` to every listed connection.
    pub async fn send_many(&self, targets: &[ConnId], event: &ServerEvent) {
        let conns = self.connections.read().await;
        for conn in targets {
            if let Some(connection) = conns.get(conn)
                && connection.tx.send(event.clone()).is_err()
            {
                tracing::debug!(conn = %conn, "outbound channel closed, dropping event");
            }
        }
    }

    /// Sends a clone of `event` to every live connection.
    pub async fn broadcast_all(&self, event: &ServerEvent) {
        let conns = self.connections.read().await;
        for (conn, connection) in conns.iter() {
            if connection.tx.send(event.clone()).is_err() {
                tracing::debug!(conn = %conn, "outbound channel closed, dropping event");
            }
        }
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no connections are registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
