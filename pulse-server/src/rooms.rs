//! Room membership for fan-out scoping.
//!
//! Three room namespaces: per-user (auto-joined at connect time, used for
//! delivery targeting regardless of which view is open), per-session
//! (joined when a client opens that conversation), and per-group. Rooms
//! are protocol-level state only — rebuilt from explicit joins whenever a
//! client attaches to a view, never persisted.

use std::collections::{HashMap, HashSet};

use pulse_proto::ids::{GroupId, SessionId, UserId};
use pulse_proto::message::Scope;
use tokio::sync::RwLock;

use crate::hub::ConnId;

/// A fan-out target namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// All of one user's connections; delivery targeting.
    User(UserId),
    /// Connections viewing a 1:1 session; typing and reaction broadcasts.
    Session(SessionId),
    /// Connections viewing a group.
    Group(GroupId),
}

impl RoomId {
    /// Maps a conversation scope to its room.
    #[must_use]
    pub fn from_scope(scope: &Scope) -> Self {
        match scope {
            Scope::Session(id) => Self::Session(id.clone()),
            Scope::Group(id) => Self::Group(id.clone()),
        }
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Session(id) => write!(f, "session:{id}"),
            Self::Group(id) => write!(f, "group:{id}"),
        }
    }
}

/// Forward and reverse membership indexes, kept consistent under one lock.
#[derive(Default)]
struct Membership {
    rooms: HashMap<RoomId, HashSet<ConnId>>,
    joined: HashMap<ConnId, HashSet<RoomId>>,
}

/// Tracks which connections have joined which rooms.
///
/// All operations are idempotent: joining a room twice or leaving a room
/// never joined is a no-op.
pub struct RoomMembership {
    inner: RwLock<Membership>,
}

impl Default for RoomMembership {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomMembership {
    /// Creates an empty membership table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Membership::default()),
        }
    }

    /// Adds a connection to a room. Returns `true` if it was newly joined.
    pub async fn join(&self, conn: ConnId, room: RoomId) -> bool {
        let mut inner = self.inner.write().await;
        let newly = inner.rooms.entry(room.clone()).or_default().insert(conn);
        if newly {
            inner.joined.entry(conn).or_default().insert(room);
        }
        drop(inner);
        newly
    }

    /// Removes a connection from a room. Returns `true` if it was a member.
    pub async fn leave(&self, conn: ConnId, room: &RoomId) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner
            .rooms
            .get_mut(room)
            .is_some_and(|members| members.remove(&conn));
        if removed {
            if inner.rooms.get(room).is_some_and(HashSet::is_empty) {
                inner.rooms.remove(room);
            }
            if let Some(joined) = inner.joined.get_mut(&conn) {
                joined.remove(room);
                if joined.is_empty() {
                    inner.joined.remove(&conn);
                }
            }
        }
        drop(inner);
        removed
    }

    /// Removes a connection from every room it joined, returning those rooms.
    pub async fn leave_all(&self, conn: ConnId) -> Vec<RoomId> {
        let mut inner = self.inner.write().await;
        let rooms: Vec<RoomId> = inner
            .joined
            .remove(&conn)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for room in &rooms {
            if let Some(members) = inner.rooms.get_mut(room) {
                members.remove(&conn);
                if members.is_empty() {
                    inner.rooms.remove(room);
                }
            }
        }
        drop(inner);
        rooms
    }

    /// Returns the connections currently in a room.
    pub async fn members(&self, room: &RoomId) -> Vec<ConnId> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if the connection has joined the room.
    pub async fn is_member(&self, conn: ConnId, room: &RoomId) -> bool {
        let inner = self.inner.read().await;
        inner.rooms.get(room).is_some_and(|set| set.contains(&conn))
    }
}
