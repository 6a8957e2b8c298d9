//! Presence registry: which users currently have live connections.
//!
//! A user is online iff their connection-handle set is non-empty. The
//! registry is a pure in-memory map; the online/offline broadcasts and the
//! best-effort persistence writes happen in the owning
//! [`Realtime`](crate::realtime::Realtime) service, keyed off the
//! transition flags returned here.

use std::collections::{HashMap, HashSet};

use pulse_proto::ids::UserId;
use tokio::sync::RwLock;

use crate::hub::ConnId;

/// In-memory map of user id to live connection handles.
pub struct PresenceRegistry {
    online: RwLock<HashMap<UserId, HashSet<ConnId>>>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    /// Creates a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            online: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a connection handle to the user's set.
    ///
    /// Returns `true` iff this registration took the user from offline to
    /// online (first connection). Registering the same (user, connection)
    /// pair twice leaves the set unchanged and returns `false`, so callers
    /// never emit a duplicate online broadcast.
    pub async fn register(&self, user_id: &UserId, conn: ConnId) -> bool {
        let mut online = self.online.write().await;
        let conns = online.entry(user_id.clone()).or_default();
        let was_offline = conns.is_empty();
        let inserted = conns.insert(conn);
        drop(online);
        was_offline && inserted
    }

    /// Removes a connection handle from the user's set.
    ///
    /// Returns `true` iff this removal took the user offline (the set
    /// became empty). Unknown pairs are a no-op returning `false`.
    pub async fn unregister(&self, user_id: &UserId, conn: ConnId) -> bool {
        let mut online = self.online.write().await;
        let Some(conns) = online.get_mut(user_id) else {
            return false;
        };
        let removed = conns.remove(&conn);
        let now_offline = removed && conns.is_empty();
        if now_offline {
            online.remove(user_id);
        }
        drop(online);
        now_offline
    }

    /// Returns `true` if the user has at least one live connection.
    pub async fn is_online(&self, user_id: &UserId) -> bool {
        let online = self.online.read().await;
        online.get(user_id).is_some_and(|c| !c.is_empty())
    }

    /// Returns the ids of all currently-online users.
    pub async fn list_online(&self) -> Vec<UserId> {
        let online = self.online.read().await;
        online.keys().cloned().collect()
    }

    /// Number of live connections for a user (0 if offline).
    pub async fn connection_count(&self, user_id: &UserId) -> usize {
        let online = self.online.read().await;
        online.get(user_id).map_or(0, HashSet::len)
    }
}
