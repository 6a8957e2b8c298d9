//! Persistence seam for the realtime layer.
//!
//! The relational store is an external collaborator; the hub consumes it
//! through the narrow [`ChatStore`] trait — single-row creates and flag
//! updates only, no multi-row transactions. [`MemoryStore`] implements the
//! trait for tests and the default binary, with explicit construction and
//! teardown (drop) instead of a process-wide lazy singleton.

use std::collections::HashMap;

use pulse_proto::ids::{GroupId, MessageId, SessionId, UserId};
use pulse_proto::message::{Attachment, ChatMessage, Reaction, Scope, Timestamp};
use tokio::sync::RwLock;

/// Errors surfaced by the persistence seam.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store rejected the write.
    #[error("store rejected write: {0}")]
    Rejected(String),
    /// The referenced entity does not exist.
    #[error("{kind} not found")]
    NotFound {
        /// What was being looked up (session, group, message).
        kind: &'static str,
    },
}

/// Fields of a message to persist. The store assigns the id and creation
/// timestamp so that ordering is decided by one clock.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// The conversation the message belongs to.
    pub scope: Scope,
    /// The author, or `None` for AI-authored messages.
    pub sender: Option<UserId>,
    /// Message text (already validated).
    pub content: String,
    /// Optional reply-to reference.
    pub reply_to: Option<MessageId>,
    /// Attachment references.
    pub attachments: Vec<Attachment>,
}

/// Async persistence interface consumed by the realtime components.
///
/// Every method is a suspension point; callers must not assume atomicity
/// across two calls. All writes are single-row operations.
pub trait ChatStore: Send + Sync {
    /// Persists a new message, assigning its id and creation timestamp.
    fn create_message(
        &self,
        new: NewMessage,
    ) -> impl std::future::Future<Output = Result<ChatMessage, StoreError>> + Send;

    /// Bumps the conversation's `updated_at` for recency ordering.
    fn touch_scope(
        &self,
        scope: &Scope,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Resolves the participants of a 1:1 session (exactly two).
    fn session_participants(
        &self,
        session_id: &SessionId,
    ) -> impl std::future::Future<Output = Result<Vec<UserId>, StoreError>> + Send;

    /// Resolves the members of a group.
    fn group_members(
        &self,
        group_id: &GroupId,
    ) -> impl std::future::Future<Output = Result<Vec<UserId>, StoreError>> + Send;

    /// Marks a message delivered. Idempotent: repeated calls keep the first
    /// delivery timestamp. Returns the updated message.
    fn mark_delivered(
        &self,
        message_id: &MessageId,
    ) -> impl std::future::Future<Output = Result<ChatMessage, StoreError>> + Send;

    /// Bulk-marks the listed messages read by `reader`, skipping any the
    /// reader authored. Returns the distinct senders of the affected
    /// messages (AI-authored messages have no sender to notify).
    fn mark_read(
        &self,
        session_id: &SessionId,
        reader: &UserId,
        message_ids: &[MessageId],
        read_at: Timestamp,
    ) -> impl std::future::Future<Output = Result<Vec<UserId>, StoreError>> + Send;

    /// Returns `true` if a reaction row exists for the exact triple.
    fn reaction_exists(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Inserts a reaction row.
    fn add_reaction(
        &self,
        reaction: Reaction,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Deletes every reaction row matching the triple (tolerates legacy
    /// duplicates), returning how many were removed.
    fn remove_reactions(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> impl std::future::Future<Output = Result<usize, StoreError>> + Send;

    /// Persists a user's online flag and last-seen timestamp. Callers treat
    /// this as best-effort.
    fn set_presence(
        &self,
        user_id: &UserId,
        online: bool,
        last_seen: Option<Timestamp>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Recorded presence row in the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRow {
    /// Whether the user is flagged online.
    pub online: bool,
    /// Last-seen timestamp recorded at the offline transition.
    pub last_seen: Option<Timestamp>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: HashMap<SessionId, Vec<UserId>>,
    groups: HashMap<GroupId, Vec<UserId>>,
    messages: HashMap<MessageId, ChatMessage>,
    reactions: Vec<Reaction>,
    presence: HashMap<UserId, PresenceRow>,
    touched: HashMap<Scope, Timestamp>,
    fail_writes: bool,
}

/// In-memory [`ChatStore`] used by tests and the default binary.
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner::default()),
        }
    }

    /// Registers a 1:1 session with its two participants.
    pub async fn add_session(&self, session_id: SessionId, a: UserId, b: UserId) {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(session_id, vec![a, b]);
    }

    /// Registers a group with its member list.
    pub async fn add_group(&self, group_id: GroupId, members: Vec<UserId>) {
        let mut inner = self.inner.write().await;
        inner.groups.insert(group_id, members);
    }

    /// When set, every subsequent write is rejected. Used by tests to
    /// exercise the persistence-failure path.
    pub async fn set_fail_writes(&self, fail: bool) {
        let mut inner = self.inner.write().await;
        inner.fail_writes = fail;
    }

    /// Looks up a persisted message by id.
    pub async fn message(&self, message_id: &MessageId) -> Option<ChatMessage> {
        let inner = self.inner.read().await;
        inner.messages.get(message_id).cloned()
    }

    /// Number of persisted messages.
    pub async fn message_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.messages.len()
    }

    /// Reaction rows for a message.
    pub async fn reactions_for(&self, message_id: &MessageId) -> Vec<Reaction> {
        let inner = self.inner.read().await;
        inner
            .reactions
            .iter()
            .filter(|r| r.message_id == *message_id)
            .cloned()
            .collect()
    }

    /// The last persisted presence row for a user.
    pub async fn presence_row(&self, user_id: &UserId) -> Option<PresenceRow> {
        let inner = self.inner.read().await;
        inner.presence.get(user_id).cloned()
    }

    /// The last recorded `updated_at` for a conversation.
    pub async fn touched_at(&self, scope: &Scope) -> Option<Timestamp> {
        let inner = self.inner.read().await;
        inner.touched.get(scope).copied()
    }
}

fn write_gate(inner: &MemoryInner) -> Result<(), StoreError> {
    if inner.fail_writes {
        return Err(StoreError::Rejected("write failure injected".into()));
    }
    Ok(())
}

impl ChatStore for MemoryStore {
    async fn create_message(&self, new: NewMessage) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.write().await;
        write_gate(&inner)?;
        match &new.scope {
            Scope::Session(id) if !inner.sessions.contains_key(id) => {
                return Err(StoreError::NotFound { kind: "session" });
            }
            Scope::Group(id) if !inner.groups.contains_key(id) => {
                return Err(StoreError::NotFound { kind: "group" });
            }
            _ => {}
        }
        let message = ChatMessage {
            id: MessageId::new(),
            scope: new.scope,
            sender: new.sender,
            content: new.content,
            reply_to: new.reply_to,
            attachments: new.attachments,
            created_at: Timestamp::now(),
            delivered_at: None,
            read_at: None,
        };
        inner.messages.insert(message.id.clone(), message.clone());
        drop(inner);
        Ok(message)
    }

    async fn touch_scope(&self, scope: &Scope) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        write_gate(&inner)?;
        inner.touched.insert(scope.clone(), Timestamp::now());
        drop(inner);
        Ok(())
    }

    async fn session_participants(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<UserId>, StoreError> {
        let inner = self.inner.read().await;
        inner
            .sessions
            .get(session_id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "session" })
    }

    async fn group_members(&self, group_id: &GroupId) -> Result<Vec<UserId>, StoreError> {
        let inner = self.inner.read().await;
        inner
            .groups
            .get(group_id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "group" })
    }

    async fn mark_delivered(&self, message_id: &MessageId) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.write().await;
        write_gate(&inner)?;
        let message = inner
            .messages
            .get_mut(message_id)
            .ok_or(StoreError::NotFound { kind: "message" })?;
        if message.delivered_at.is_none() {
            message.delivered_at = Some(Timestamp::now());
        }
        let updated = message.clone();
        drop(inner);
        Ok(updated)
    }

    async fn mark_read(
        &self,
        session_id: &SessionId,
        reader: &UserId,
        message_ids: &[MessageId],
        read_at: Timestamp,
    ) -> Result<Vec<UserId>, StoreError> {
        let mut inner = self.inner.write().await;
        write_gate(&inner)?;
        let mut senders: Vec<UserId> = Vec::new();
        for id in message_ids {
            let Some(message) = inner.messages.get_mut(id) else {
                continue;
            };
            if message.scope != Scope::Session(session_id.clone()) {
                continue;
            }
            if message.sender.as_ref() == Some(reader) {
                continue;
            }
            if message.read_at.is_none() {
                message.read_at = Some(read_at);
            }
            if let Some(sender) = &message.sender
                && !senders.contains(sender)
            {
                senders.push(sender.clone());
            }
        }
        drop(inner);
        Ok(senders)
    }

    async fn reaction_exists(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.reactions.iter().any(|r| {
            r.message_id == *message_id && r.user_id == *user_id && r.emoji == emoji
        }))
    }

    async fn add_reaction(&self, reaction: Reaction) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        write_gate(&inner)?;
        inner.reactions.push(reaction);
        drop(inner);
        Ok(())
    }

    async fn remove_reactions(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        write_gate(&inner)?;
        let before = inner.reactions.len();
        inner.reactions.retain(|r| {
            !(r.message_id == *message_id && r.user_id == *user_id && r.emoji == emoji)
        });
        let removed = before - inner.reactions.len();
        drop(inner);
        Ok(removed)
    }

    async fn set_presence(
        &self,
        user_id: &UserId,
        online: bool,
        last_seen: Option<Timestamp>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        write_gate(&inner)?;
        inner
            .presence
            .insert(user_id.clone(), PresenceRow { online, last_seen });
        drop(inner);
        Ok(())
    }
}
