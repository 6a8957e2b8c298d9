//! Emoji reactions on direct messages.
//!
//! Adding is idempotent per `(emoji, user, message)` triple: a duplicate
//! add neither writes nor broadcasts. Removal deletes every matching row so
//! that duplicates from before the uniqueness rule still clear in one call.
//! Both broadcasts go to the whole session room, the acting connection
//! included, so every open view converges on the same reaction set.

use std::sync::Arc;

use pulse_proto::event::ServerEvent;
use pulse_proto::ids::{MessageId, SessionId};
use pulse_proto::message::{Reaction, Timestamp};

use crate::hub::ConnId;
use crate::realtime::{HandlerError, Realtime};
use crate::rooms::RoomId;
use crate::store::ChatStore;

impl<S: ChatStore + 'static> Realtime<S> {
    /// Handles a reaction add. A duplicate of an existing reaction is a
    /// silent no-op.
    pub async fn add_reaction(
        self: &Arc<Self>,
        conn: ConnId,
        session_id: SessionId,
        message_id: MessageId,
        emoji: String,
    ) -> Result<(), HandlerError> {
        let user_id = self.user_of(conn).await?;

        if self
            .store
            .reaction_exists(&message_id, &user_id, &emoji)
            .await?
        {
            return Ok(());
        }

        let reaction = Reaction {
            message_id,
            user_id,
            emoji,
            created_at: Timestamp::now(),
        };
        self.store.add_reaction(reaction.clone()).await?;
        self.to_room(
            &RoomId::Session(session_id.clone()),
            None,
            &ServerEvent::ReactionAdded {
                session_id,
                reaction,
            },
        )
        .await;
        Ok(())
    }

    /// Handles a reaction removal. Removing a reaction that does not exist
    /// is a silent no-op.
    pub async fn remove_reaction(
        self: &Arc<Self>,
        conn: ConnId,
        session_id: SessionId,
        message_id: MessageId,
        emoji: String,
    ) -> Result<(), HandlerError> {
        let user_id = self.user_of(conn).await?;

        let removed = self
            .store
            .remove_reactions(&message_id, &user_id, &emoji)
            .await?;
        if removed > 0 {
            self.to_room(
                &RoomId::Session(session_id.clone()),
                None,
                &ServerEvent::ReactionRemoved {
                    session_id,
                    message_id,
                    emoji,
                    user_id,
                },
            )
            .await;
        }
        Ok(())
    }
}
