//! Group messaging and client-driven relay rebroadcasts.
//!
//! A group send follows the same persist-then-confirm shape as a direct
//! send, but fans out through the group room and is gated on the sender's
//! group membership. Edits, deletes, tasks, and completed AI turns are not
//! persisted here: the client that performed the mutation (over HTTP, or by
//! running the AI turn) re-emits the finished result, and the hub relays it
//! verbatim to the other connections in the room.

use std::sync::Arc;

use pulse_proto::event::{ServerEvent, TaskEventKind};
use pulse_proto::ids::{GroupId, MessageId, TempId};
use pulse_proto::message::{validate_content, ChatMessage, Scope, Timestamp};

use crate::hub::ConnId;
use crate::realtime::{HandlerError, Realtime};
use crate::rooms::RoomId;
use crate::store::{ChatStore, NewMessage};

impl<S: ChatStore + 'static> Realtime<S> {
    /// Handles a group send: validate, check membership, persist, confirm
    /// to the sender, and fan out to the rest of the group room.
    pub async fn send_group(
        self: &Arc<Self>,
        conn: ConnId,
        group_id: GroupId,
        content: String,
        temp_id: TempId,
        reply_to: Option<MessageId>,
    ) -> Result<(), HandlerError> {
        let sender = self.user_of(conn).await?;
        validate_content(&content)?;

        let members = self.store.group_members(&group_id).await?;
        if !members.contains(&sender) {
            return Err(HandlerError::MembershipDenied);
        }

        let message = self
            .store
            .create_message(NewMessage {
                scope: Scope::Group(group_id.clone()),
                sender: Some(sender),
                content,
                reply_to,
                attachments: Vec::new(),
            })
            .await?;
        self.store.touch_scope(&message.scope).await?;

        self.hub
            .send(
                conn,
                ServerEvent::GroupMessageConfirm {
                    group_id: group_id.clone(),
                    temp_id,
                    message: message.clone(),
                },
            )
            .await;
        self.to_room(
            &RoomId::Group(group_id.clone()),
            Some(conn),
            &ServerEvent::GroupMessageNew { group_id, message },
        )
        .await;
        Ok(())
    }

    /// Relays a completed AI message to the other members of the group
    /// room. The message was already persisted by the client that ran the
    /// AI turn; the hub only rebroadcasts it.
    pub async fn relay_ai_message(
        self: &Arc<Self>,
        conn: ConnId,
        group_id: GroupId,
        message: ChatMessage,
    ) -> Result<(), HandlerError> {
        self.require_in_group(conn, &group_id).await?;
        self.to_room(
            &RoomId::Group(group_id.clone()),
            Some(conn),
            &ServerEvent::GroupMessageNew { group_id, message },
        )
        .await;
        Ok(())
    }

    /// Relays an already-persisted edit to the other members.
    pub async fn relay_edit(
        self: &Arc<Self>,
        conn: ConnId,
        group_id: GroupId,
        message_id: MessageId,
        content: String,
        edited_at: Timestamp,
    ) -> Result<(), HandlerError> {
        self.require_in_group(conn, &group_id).await?;
        self.to_room(
            &RoomId::Group(group_id.clone()),
            Some(conn),
            &ServerEvent::GroupMessageEdited {
                group_id,
                message_id,
                content,
                edited_at,
            },
        )
        .await;
        Ok(())
    }

    /// Relays an already-persisted delete to the other members.
    pub async fn relay_delete(
        self: &Arc<Self>,
        conn: ConnId,
        group_id: GroupId,
        message_id: MessageId,
    ) -> Result<(), HandlerError> {
        self.require_in_group(conn, &group_id).await?;
        self.to_room(
            &RoomId::Group(group_id.clone()),
            Some(conn),
            &ServerEvent::GroupMessageDeleted {
                group_id,
                message_id,
            },
        )
        .await;
        Ok(())
    }

    /// Relays a task lifecycle event to the other members. The payload is
    /// opaque to the hub and passed through untouched.
    pub async fn relay_task(
        self: &Arc<Self>,
        conn: ConnId,
        group_id: GroupId,
        kind: TaskEventKind,
        payload: Vec<u8>,
    ) -> Result<(), HandlerError> {
        self.require_in_group(conn, &group_id).await?;
        self.to_room(
            &RoomId::Group(group_id.clone()),
            Some(conn),
            &ServerEvent::GroupTaskEvent {
                group_id,
                kind,
                payload,
            },
        )
        .await;
        Ok(())
    }

    /// Relays require the triggering connection to be in the group room;
    /// joining is how a client declares interest in a group's traffic.
    async fn require_in_group(&self, conn: ConnId, group_id: &GroupId) -> Result<(), HandlerError> {
        if self
            .rooms
            .is_member(conn, &RoomId::Group(group_id.clone()))
            .await
        {
            Ok(())
        } else {
            Err(HandlerError::MembershipDenied)
        }
    }
}
