//! The realtime service: connection lifecycle and event dispatch.
//!
//! [`Realtime`] owns the in-memory hub state (connections, presence, rooms,
//! typing timers) and borrows persistence through the [`ChatStore`] seam.
//! Handlers for the individual frame families live in the sibling modules
//! (`delivery`, `reactions`, `groups`, `typing`) as extension impls on this
//! type; this module holds the shared plumbing they build on.

use std::sync::Arc;
use std::time::Duration;

use pulse_proto::event::{ClientEvent, ServerEvent};
use pulse_proto::ids::UserId;
use pulse_proto::message::{Timestamp, ValidationError};
use tokio::sync::mpsc;

use crate::hub::{ConnId, Hub};
use crate::presence::PresenceRegistry;
use crate::rooms::{RoomId, RoomMembership};
use crate::store::{ChatStore, StoreError};
use crate::typing::TypingTracker;

/// Why a frame handler refused or failed to process an event.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The connection sent a frame before identifying itself.
    #[error("connection has not identified itself")]
    Unidentified,
    /// The user is not a participant of the target conversation.
    #[error("not a participant of this conversation")]
    MembershipDenied,
    /// Message content failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The persistence layer rejected or failed the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The realtime hub service, generic over its persistence backend.
pub struct Realtime<S> {
    pub(crate) hub: Hub,
    pub(crate) presence: PresenceRegistry,
    pub(crate) rooms: RoomMembership,
    pub(crate) typing: TypingTracker,
    pub(crate) store: Arc<S>,
}

impl<S: ChatStore + 'static> Realtime<S> {
    /// Creates the service around a store, with the given typing quiet
    /// period.
    #[must_use]
    pub fn new(store: Arc<S>, typing_quiet: Duration) -> Arc<Self> {
        Arc::new(Self {
            hub: Hub::new(),
            presence: PresenceRegistry::new(),
            rooms: RoomMembership::new(),
            typing: TypingTracker::new(typing_quiet),
            store,
        })
    }

    /// Read access to the persistence backend.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Registers an identified connection.
    ///
    /// The connection auto-joins its owner's user room so that direct
    /// messages reach every device. The first connection of a user flips
    /// them online: the flag is persisted in the background and the online
    /// event is broadcast to everyone connected.
    pub async fn connect(
        self: &Arc<Self>,
        user_id: UserId,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnId {
        let conn = self.hub.connect(user_id.clone(), tx).await;
        self.rooms.join(conn, RoomId::User(user_id.clone())).await;
        if self.presence.register(&user_id, conn).await {
            self.spawn_presence_write(user_id.clone(), true, None);
            self.hub
                .broadcast_all(&ServerEvent::UserOnline { user_id })
                .await;
        }
        conn
    }

    /// Tears a connection down: clears its rooms, and if it was the user's
    /// last connection, retires their typing timers and flips them offline.
    pub async fn disconnect(self: &Arc<Self>, conn: ConnId) {
        let Some(user_id) = self.hub.user_of(conn).await else {
            self.hub.disconnect(conn).await;
            return;
        };
        self.rooms.leave_all(conn).await;
        if self.presence.unregister(&user_id, conn).await {
            for scope in self.typing.remove_user(&user_id).await {
                self.broadcast_typing(&scope, &user_id, false, Some(conn)).await;
            }
            let last_seen = Timestamp::now();
            self.spawn_presence_write(user_id.clone(), false, Some(last_seen));
            self.hub
                .broadcast_all(&ServerEvent::UserOffline { user_id, last_seen })
                .await;
        }
        self.hub.disconnect(conn).await;
    }

    /// Routes a decoded client frame to its handler. A handler failure is
    /// reported back to the initiating connection only; store internals are
    /// not leaked.
    pub async fn handle_event(self: &Arc<Self>, conn: ConnId, event: ClientEvent) {
        if let Err(error) = self.dispatch(conn, event).await {
            tracing::warn!(%conn, %error, "event handler failed");
            let message = match &error {
                HandlerError::Store(_) => "internal error".to_string(),
                other => other.to_string(),
            };
            self.error_to(conn, message).await;
        }
    }

    async fn dispatch(self: &Arc<Self>, conn: ConnId, event: ClientEvent) -> Result<(), HandlerError> {
        match event {
            ClientEvent::Hello { .. } => {
                // Identification is a handshake concern; a repeat is a
                // client bug, not a reason to drop the connection.
                tracing::debug!(%conn, "ignoring repeated hello");
                Ok(())
            }
            ClientEvent::SessionJoin { session_id } => {
                self.rooms.join(conn, RoomId::Session(session_id)).await;
                Ok(())
            }
            ClientEvent::SessionLeave { session_id } => {
                self.rooms.leave(conn, &RoomId::Session(session_id)).await;
                Ok(())
            }
            ClientEvent::MessageSend {
                session_id,
                content,
                temp_id,
                reply_to,
                attachments,
            } => {
                self.send_direct(conn, session_id, content, temp_id, reply_to, attachments)
                    .await
            }
            ClientEvent::MessageRead {
                session_id,
                message_ids,
            } => self.mark_read(conn, session_id, message_ids).await,
            ClientEvent::TypingStart { scope } => self.start_typing(conn, scope).await,
            ClientEvent::TypingStop { scope } => self.stop_typing(conn, scope).await,
            ClientEvent::ReactionAdd {
                session_id,
                message_id,
                emoji,
            } => self.add_reaction(conn, session_id, message_id, emoji).await,
            ClientEvent::ReactionRemove {
                session_id,
                message_id,
                emoji,
            } => {
                self.remove_reaction(conn, session_id, message_id, emoji)
                    .await
            }
            ClientEvent::GroupJoin { group_id } => {
                self.rooms.join(conn, RoomId::Group(group_id)).await;
                Ok(())
            }
            ClientEvent::GroupLeave { group_id } => {
                self.rooms.leave(conn, &RoomId::Group(group_id)).await;
                Ok(())
            }
            ClientEvent::GroupMessageSend {
                group_id,
                content,
                temp_id,
                reply_to,
            } => self.send_group(conn, group_id, content, temp_id, reply_to).await,
            ClientEvent::GroupAiMessage { group_id, message } => {
                self.relay_ai_message(conn, group_id, message).await
            }
            ClientEvent::GroupMessageEdit {
                group_id,
                message_id,
                content,
                edited_at,
            } => {
                self.relay_edit(conn, group_id, message_id, content, edited_at)
                    .await
            }
            ClientEvent::GroupMessageDelete {
                group_id,
                message_id,
            } => self.relay_delete(conn, group_id, message_id).await,
            ClientEvent::GroupTask {
                group_id,
                kind,
                payload,
            } => self.relay_task(conn, group_id, kind, payload).await,
        }
    }

    /// Resolves the user owning a connection.
    pub(crate) async fn user_of(&self, conn: ConnId) -> Result<UserId, HandlerError> {
        self.hub
            .user_of(conn)
            .await
            .ok_or(HandlerError::Unidentified)
    }

    /// Sends an event to every member of a room, optionally excluding one
    /// connection (typically the one that triggered the event).
    pub(crate) async fn to_room(&self, room: &RoomId, except: Option<ConnId>, event: &ServerEvent) {
        let members = self.rooms.members(room).await;
        let targets: Vec<ConnId> = members
            .into_iter()
            .filter(|conn| Some(*conn) != except)
            .collect();
        self.hub.send_many(&targets, event).await;
    }

    /// Sends an event to every connection of a user, via their user room.
    pub(crate) async fn to_user(&self, user_id: &UserId, event: &ServerEvent) {
        self.to_room(&RoomId::User(user_id.clone()), None, event).await;
    }

    /// Reports a handler failure to one connection.
    pub(crate) async fn error_to(&self, conn: ConnId, message: String) {
        self.hub.send(conn, ServerEvent::Error { message }).await;
    }

    /// Persists a presence flag in the background. Presence rows are an
    /// approximation; a lost write is logged and otherwise ignored.
    pub(crate) fn spawn_presence_write(
        self: &Arc<Self>,
        user_id: UserId,
        online: bool,
        last_seen: Option<Timestamp>,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(error) = this.store.set_presence(&user_id, online, last_seen).await {
                tracing::warn!(%user_id, %error, "presence write failed");
            }
        });
    }
}
