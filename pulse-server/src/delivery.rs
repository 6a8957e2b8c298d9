//! Direct (1:1) message delivery.
//!
//! A send persists first and confirms second: the sender's connection gets
//! the authoritative record with its correlation id before any fan-out, so
//! the optimistic bubble reconciles even if the recipient push races it.
//! Delivery receipts are approximated from presence — an online recipient
//! is assumed to receive the push — and are best-effort: a failed delivered
//! write never fails the send that already succeeded.

use std::sync::Arc;

use pulse_proto::event::ServerEvent;
use pulse_proto::ids::{MessageId, SessionId, TempId};
use pulse_proto::message::{validate_content, Attachment, Scope, Timestamp};

use crate::hub::ConnId;
use crate::realtime::{HandlerError, Realtime};
use crate::store::{ChatStore, NewMessage};

impl<S: ChatStore + 'static> Realtime<S> {
    /// Handles a direct send: validate, persist, confirm to the sender,
    /// fan out to the recipient's devices, and record delivery if the
    /// recipient is online.
    pub async fn send_direct(
        self: &Arc<Self>,
        conn: ConnId,
        session_id: SessionId,
        content: String,
        temp_id: TempId,
        reply_to: Option<MessageId>,
        attachments: Vec<Attachment>,
    ) -> Result<(), HandlerError> {
        let sender = self.user_of(conn).await?;
        validate_content(&content)?;

        let participants = self.store.session_participants(&session_id).await?;
        if !participants.contains(&sender) {
            return Err(HandlerError::MembershipDenied);
        }

        let message = self
            .store
            .create_message(NewMessage {
                scope: Scope::Session(session_id.clone()),
                sender: Some(sender.clone()),
                content,
                reply_to,
                attachments,
            })
            .await?;
        self.store.touch_scope(&message.scope).await?;

        self.hub
            .send(
                conn,
                ServerEvent::MessageConfirm {
                    session_id: session_id.clone(),
                    temp_id,
                    message: message.clone(),
                },
            )
            .await;

        for peer in participants.iter().filter(|p| **p != sender) {
            self.to_user(
                peer,
                &ServerEvent::MessageNew {
                    session_id: session_id.clone(),
                    message: message.clone(),
                },
            )
            .await;

            if self.presence.is_online(peer).await {
                match self.store.mark_delivered(&message.id).await {
                    Ok(updated) => {
                        if let Some(delivered_at) = updated.delivered_at {
                            self.to_user(
                                &sender,
                                &ServerEvent::MessageDelivered {
                                    message_id: updated.id,
                                    delivered_at,
                                },
                            )
                            .await;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(message_id = %message.id, %error, "delivered write failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Handles a read notification: persist the read markers and route a
    /// receipt to the sender of each affected message. A read of one's own
    /// or already-read messages notifies nobody.
    pub async fn mark_read(
        self: &Arc<Self>,
        conn: ConnId,
        session_id: SessionId,
        message_ids: Vec<MessageId>,
    ) -> Result<(), HandlerError> {
        let reader = self.user_of(conn).await?;
        if message_ids.is_empty() {
            return Ok(());
        }

        let read_at = Timestamp::now();
        let senders = self
            .store
            .mark_read(&session_id, &reader, &message_ids, read_at)
            .await?;
        for sender in senders {
            self.to_user(
                &sender,
                &ServerEvent::MessageRead {
                    message_ids: message_ids.clone(),
                    read_at,
                },
            )
            .await;
        }
        Ok(())
    }
}
