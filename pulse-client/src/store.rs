//! Local message list for one conversation, reconciled against hub events.
//!
//! A send is inserted optimistically with a client-minted id and `Sending`
//! status, then swapped for the authoritative server record when the
//! confirm arrives, matched by its temp id. Incoming events are idempotent:
//! a message is deduplicated by server id or temp id, and status changes
//! apply as monotonic upgrades, so receipts arriving out of order or twice
//! leave the list in the same state. The list stays sorted by
//! `(created_at, id)`, which is stable because message ids are time-ordered.

use pulse_proto::event::ServerEvent;
use pulse_proto::ids::{MessageId, TempId};
use pulse_proto::message::{ChatMessage, DeliveryStatus, Timestamp};

/// One message as the client tracks it: the record plus its delivery
/// status and, while unconfirmed, the correlation id of the send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMessage {
    /// The message record. For an optimistic entry this is the locally
    /// built version; reconciliation replaces it with the server's.
    pub message: ChatMessage,
    /// Correlation id of the originating send. Retained after confirmation
    /// as a stable lookup key; `None` for messages pushed from peers.
    pub temp_id: Option<TempId>,
    /// Current delivery status.
    pub status: DeliveryStatus,
}

impl LocalMessage {
    fn sort_key(&self) -> (Timestamp, MessageId) {
        (self.message.created_at, self.message.id.clone())
    }
}

/// The message list of a single conversation.
#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Vec<LocalMessage>,
}

impl ConversationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The messages in display order.
    #[must_use]
    pub fn messages(&self) -> &[LocalMessage] {
        &self.messages
    }

    /// Looks a message up by server id.
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&LocalMessage> {
        self.messages.iter().find(|m| m.message.id == *id)
    }

    /// The delivery status of a message, if present.
    #[must_use]
    pub fn status_of(&self, id: &MessageId) -> Option<DeliveryStatus> {
        self.get(id).map(|m| m.status)
    }

    /// Inserts an optimistic message for a send in flight. A repeat of the
    /// same temp id (a double-tapped send button) is ignored.
    pub fn add_optimistic(&mut self, temp_id: TempId, message: ChatMessage) {
        if self.index_by_temp(&temp_id).is_some() {
            tracing::debug!(%temp_id, "duplicate optimistic insert ignored");
            return;
        }
        self.insert_sorted(LocalMessage {
            message,
            temp_id: Some(temp_id),
            status: DeliveryStatus::Sending,
        });
    }

    /// Applies a server confirmation: the optimistic entry matching the
    /// temp id takes the authoritative record and upgrades to `Sent`,
    /// keeping the temp id as a lookup key. Without a matching temp id the
    /// record is merged by server id, so a confirm replayed after
    /// reconnect does not duplicate.
    pub fn reconcile(&mut self, temp_id: &TempId, server: ChatMessage) {
        if let Some(index) = self.index_by_temp(temp_id) {
            let existing = self.messages.remove(index);
            let mut message = server;
            // Receipts applied locally before a replayed confirm stay put.
            if message.delivered_at.is_none() {
                message.delivered_at = existing.message.delivered_at;
            }
            if message.read_at.is_none() {
                message.read_at = existing.message.read_at;
            }
            self.insert_sorted(LocalMessage {
                message,
                temp_id: existing.temp_id,
                status: existing.status.upgrade(DeliveryStatus::Sent),
            });
        } else {
            self.merge(server, DeliveryStatus::Sent);
        }
    }

    /// Inserts a message pushed from a peer. Idempotent by server id.
    pub fn add_message(&mut self, message: ChatMessage) {
        // A pushed copy of our own in-flight send carries no temp id, so
        // dedup is by server id alone.
        self.merge(message, DeliveryStatus::Delivered);
    }

    /// Applies a delivery receipt.
    pub fn apply_delivery_receipt(&mut self, id: &MessageId, delivered_at: Timestamp) {
        if let Some(entry) = self.entry_mut(id) {
            entry.status = entry.status.upgrade(DeliveryStatus::Delivered);
            if entry.message.delivered_at.is_none() {
                entry.message.delivered_at = Some(delivered_at);
            }
        }
    }

    /// Applies a read receipt to a batch of messages.
    pub fn apply_read_receipt(&mut self, ids: &[MessageId], read_at: Timestamp) {
        for id in ids {
            if let Some(entry) = self.entry_mut(id) {
                entry.status = entry.status.upgrade(DeliveryStatus::Read);
                if entry.message.read_at.is_none() {
                    entry.message.read_at = Some(read_at);
                }
            }
        }
    }

    /// Marks an unconfirmed send as failed. The status lattice makes this
    /// a no-op once the message has been confirmed.
    pub fn mark_failed(&mut self, temp_id: &TempId) {
        if let Some(index) = self.index_by_temp(temp_id) {
            let entry = &mut self.messages[index];
            entry.status = entry.status.upgrade(DeliveryStatus::Failed);
        }
    }

    /// Folds a hub event into the store. Events for other concerns
    /// (presence, typing, groups this store does not track) are ignored.
    pub fn apply(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::MessageConfirm {
                temp_id, message, ..
            }
            | ServerEvent::GroupMessageConfirm {
                temp_id, message, ..
            } => self.reconcile(&temp_id, message),
            ServerEvent::MessageNew { message, .. }
            | ServerEvent::GroupMessageNew { message, .. } => self.add_message(message),
            ServerEvent::MessageDelivered {
                message_id,
                delivered_at,
            } => self.apply_delivery_receipt(&message_id, delivered_at),
            ServerEvent::MessageRead {
                message_ids,
                read_at,
            } => self.apply_read_receipt(&message_ids, read_at),
            _ => {}
        }
    }

    fn index_by_temp(&self, temp_id: &TempId) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.temp_id.as_ref() == Some(temp_id))
    }

    fn entry_mut(&mut self, id: &MessageId) -> Option<&mut LocalMessage> {
        self.messages.iter_mut().find(|m| m.message.id == *id)
    }

    /// Inserts or updates by server id, never regressing status and never
    /// overwriting delivered/read markers already present locally.
    fn merge(&mut self, message: ChatMessage, status: DeliveryStatus) {
        if let Some(entry) = self.entry_mut(&message.id) {
            entry.status = entry.status.upgrade(status);
            if entry.message.delivered_at.is_none() {
                entry.message.delivered_at = message.delivered_at;
            }
            if entry.message.read_at.is_none() {
                entry.message.read_at = message.read_at;
            }
        } else {
            self.insert_sorted(LocalMessage {
                message,
                temp_id: None,
                status,
            });
        }
    }

    fn insert_sorted(&mut self, entry: LocalMessage) {
        let key = entry.sort_key();
        let index = self
            .messages
            .partition_point(|m| m.sort_key() <= key);
        self.messages.insert(index, entry);
    }
}
