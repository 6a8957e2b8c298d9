//! The bidirectional realtime event protocol.
//!
//! Events form two closed tagged unions: [`ClientEvent`] for frames the
//! client emits and [`ServerEvent`] for frames the hub pushes. Payload
//! shapes are fixed by the enum variants, so a malformed frame fails at the
//! decode boundary with a typed error instead of leaking missing fields
//! into handlers.

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, MessageId, SessionId, TempId, UserId};
use crate::message::{Attachment, ChatMessage, Reaction, Scope, Timestamp};

/// Lifecycle stage of a group task event. The payload itself is opaque to
/// the realtime layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEventKind {
    /// A task was created.
    Created,
    /// A task was updated.
    Updated,
    /// A task was completed.
    Completed,
}

/// Frames sent from a client to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Identifies the connection. Must be the first frame after the
    /// WebSocket handshake; the user id was already validated by the auth
    /// collaborator and the realtime layer trusts it.
    Hello {
        /// The authenticated user id.
        user_id: UserId,
    },

    /// Join a session room (opening that conversation's view).
    SessionJoin {
        /// The session to join.
        session_id: SessionId,
    },
    /// Leave a session room.
    SessionLeave {
        /// The session to leave.
        session_id: SessionId,
    },

    /// Send a direct (1:1) message.
    MessageSend {
        /// Target session.
        session_id: SessionId,
        /// Message text.
        content: String,
        /// Client-generated correlation id for optimistic reconciliation.
        temp_id: TempId,
        /// Optional reply-to reference.
        reply_to: Option<MessageId>,
        /// Attachment references, possibly empty.
        attachments: Vec<Attachment>,
    },
    /// Mark messages in a session as read by this user.
    MessageRead {
        /// The session the messages belong to.
        session_id: SessionId,
        /// The messages that were viewed.
        message_ids: Vec<MessageId>,
    },

    /// The user started typing in a session or group.
    TypingStart {
        /// The conversation being typed in.
        scope: Scope,
    },
    /// The user stopped typing in a session or group.
    TypingStop {
        /// The conversation that was being typed in.
        scope: Scope,
    },

    /// Add an emoji reaction to a message.
    ReactionAdd {
        /// The session the message belongs to.
        session_id: SessionId,
        /// The message being reacted to.
        message_id: MessageId,
        /// The emoji.
        emoji: String,
    },
    /// Remove an emoji reaction from a message.
    ReactionRemove {
        /// The session the message belongs to.
        session_id: SessionId,
        /// The message the reaction is on.
        message_id: MessageId,
        /// The emoji.
        emoji: String,
    },

    /// Join a group room.
    GroupJoin {
        /// The group to join.
        group_id: GroupId,
    },
    /// Leave a group room.
    GroupLeave {
        /// The group to leave.
        group_id: GroupId,
    },

    /// Send a group message.
    GroupMessageSend {
        /// Target group.
        group_id: GroupId,
        /// Message text.
        content: String,
        /// Client-generated correlation id.
        temp_id: TempId,
        /// Optional reply-to reference.
        reply_to: Option<MessageId>,
    },
    /// Relay trigger: the client that ran the AI turn re-emits the
    /// completed, already-persisted AI message for rebroadcast to peers.
    GroupAiMessage {
        /// The group the AI message belongs to.
        group_id: GroupId,
        /// The full persisted AI message.
        message: ChatMessage,
    },
    /// Propagate an already-persisted edit to other members.
    GroupMessageEdit {
        /// The group the message belongs to.
        group_id: GroupId,
        /// The edited message.
        message_id: MessageId,
        /// The new content.
        content: String,
        /// When the edit was persisted.
        edited_at: Timestamp,
    },
    /// Propagate an already-persisted delete to other members.
    GroupMessageDelete {
        /// The group the message belonged to.
        group_id: GroupId,
        /// The deleted message.
        message_id: MessageId,
    },
    /// Propagate a task lifecycle event. The payload is opaque.
    GroupTask {
        /// The group the task belongs to.
        group_id: GroupId,
        /// Which lifecycle stage occurred.
        kind: TaskEventKind,
        /// Opaque task payload bytes.
        payload: Vec<u8>,
    },
}

/// Frames pushed from the hub to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// A user's first connection came online. Broadcast to everyone.
    UserOnline {
        /// The user who came online.
        user_id: UserId,
    },
    /// A user's last connection went away. Broadcast to everyone.
    UserOffline {
        /// The user who went offline.
        user_id: UserId,
        /// When they were last seen.
        last_seen: Timestamp,
    },

    /// Confirms a direct send to the sending connection only; carries the
    /// correlation id so the optimistic bubble can be reconciled.
    MessageConfirm {
        /// The session the message belongs to.
        session_id: SessionId,
        /// The correlation id from the originating send.
        temp_id: TempId,
        /// The authoritative persisted message.
        message: ChatMessage,
    },
    /// A new direct message, delivered via the recipient's user room.
    MessageNew {
        /// The session the message belongs to.
        session_id: SessionId,
        /// The persisted message.
        message: ChatMessage,
    },
    /// Delivery receipt back to the sender.
    MessageDelivered {
        /// The delivered message.
        message_id: MessageId,
        /// When delivery was recorded.
        delivered_at: Timestamp,
    },
    /// Read receipt back to a sender.
    MessageRead {
        /// The messages that were read.
        message_ids: Vec<MessageId>,
        /// When they were read.
        read_at: Timestamp,
    },

    /// Ephemeral typing state for a conversation.
    TypingIndicator {
        /// The conversation being typed in.
        scope: Scope,
        /// The typing user.
        user_id: UserId,
        /// `true` on start, `false` on stop or expiry.
        is_typing: bool,
    },

    /// A reaction was added; broadcast to the session room.
    ReactionAdded {
        /// The session the message belongs to.
        session_id: SessionId,
        /// The full persisted reaction record.
        reaction: Reaction,
    },
    /// A reaction was removed; broadcast to the session room.
    ReactionRemoved {
        /// The session the message belongs to.
        session_id: SessionId,
        /// The message the reaction was on.
        message_id: MessageId,
        /// The emoji that was removed.
        emoji: String,
        /// The user whose reaction was removed.
        user_id: UserId,
    },

    /// Confirms a group send to the sending connection only.
    GroupMessageConfirm {
        /// The group the message belongs to.
        group_id: GroupId,
        /// The correlation id from the originating send.
        temp_id: TempId,
        /// The authoritative persisted message.
        message: ChatMessage,
    },
    /// A new group message (user-authored or AI relay), broadcast to the
    /// other members of the group room.
    GroupMessageNew {
        /// The group the message belongs to.
        group_id: GroupId,
        /// The persisted message.
        message: ChatMessage,
    },
    /// An edit propagated to other group members.
    GroupMessageEdited {
        /// The group the message belongs to.
        group_id: GroupId,
        /// The edited message.
        message_id: MessageId,
        /// The new content.
        content: String,
        /// When the edit was persisted.
        edited_at: Timestamp,
    },
    /// A delete propagated to other group members.
    GroupMessageDeleted {
        /// The group the message belonged to.
        group_id: GroupId,
        /// The deleted message.
        message_id: MessageId,
    },
    /// A task lifecycle event propagated to other group members.
    GroupTaskEvent {
        /// The group the task belongs to.
        group_id: GroupId,
        /// Which lifecycle stage occurred.
        kind: TaskEventKind,
        /// Opaque task payload bytes, relayed verbatim.
        payload: Vec<u8>,
    },

    /// A handler failed; sent to the initiating connection only.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}
