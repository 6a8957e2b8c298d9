//! Message and reaction data model for the Pulse protocol.
//!
//! [`ChatMessage`] is the persisted message record as the realtime layer
//! sees it: created by the Delivery Engine, mutated only through its
//! delivered/read markers. [`DeliveryStatus`] is the client-side lifecycle
//! lattice; receipts apply as monotonic upgrades and never regress.

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, MessageId, SessionId, UserId};

/// Maximum allowed message content size in bytes (64 KB).
pub const MAX_CONTENT_SIZE: usize = 64 * 1024;

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// The conversation a message belongs to: a 1:1 session or a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// A 1:1 conversation between exactly two participants.
    Session(SessionId),
    /// A multi-member group conversation.
    Group(GroupId),
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(id) => write!(f, "session:{id}"),
            Self::Group(id) => write!(f, "group:{id}"),
        }
    }
}

/// Reference to an uploaded attachment. Upload/storage happens over the
/// HTTP layer; the realtime layer only carries the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Storage identifier for the uploaded object.
    pub id: String,
    /// Original file name shown in the UI.
    pub name: String,
    /// MIME type of the attachment.
    pub mime: String,
}

/// A persisted chat message as carried over the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned message identifier.
    pub id: MessageId,
    /// The conversation this message belongs to.
    pub scope: Scope,
    /// The author, or `None` for AI-authored messages.
    pub sender: Option<UserId>,
    /// Message text.
    pub content: String,
    /// Optional reference to the message being replied to.
    pub reply_to: Option<MessageId>,
    /// Attachment references, possibly empty.
    pub attachments: Vec<Attachment>,
    /// When the message was created (server clock).
    pub created_at: Timestamp,
    /// When the message was marked delivered (1:1 only).
    pub delivered_at: Option<Timestamp>,
    /// When the message was marked read (1:1 only).
    pub read_at: Option<Timestamp>,
}

/// An emoji reaction on a message.
///
/// Invariant: at most one persisted reaction per (emoji, user, message)
/// triple; adding a duplicate is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// The message being reacted to.
    pub message_id: MessageId,
    /// The reacting user.
    pub user_id: UserId,
    /// The emoji, as its string rendering.
    pub emoji: String,
    /// When the reaction was created.
    pub created_at: Timestamp,
}

/// Error returned when message content fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Message content is empty.
    #[error("message content is empty")]
    Empty,
    /// Message content exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the content in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates message content before persistence.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] if the content is empty, or
/// [`ValidationError::TooLarge`] if it exceeds [`MAX_CONTENT_SIZE`].
pub const fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.is_empty() {
        return Err(ValidationError::Empty);
    }
    let size = content.len();
    if size > MAX_CONTENT_SIZE {
        return Err(ValidationError::TooLarge {
            size,
            max: MAX_CONTENT_SIZE,
        });
    }
    Ok(())
}

/// Client-side delivery lifecycle of a message.
///
/// `Sending -> {Sent | Failed}`; `Sent -> Delivered -> Read`. Receipts may
/// arrive out of order, so status changes apply through [`upgrade`], which
/// only ever moves forward along the lattice.
///
/// [`upgrade`]: DeliveryStatus::upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Optimistically inserted, awaiting server confirmation.
    Sending,
    /// Confirmed by the server, not yet delivered.
    Sent,
    /// Delivered to an online recipient.
    Delivered,
    /// Read by the recipient.
    Read,
    /// Send failed; terminal, the user may manually resend.
    Failed,
}

impl DeliveryStatus {
    /// Position in the forward lattice. `Failed` sits outside the chain and
    /// shares rank 0 with `Sending`; the [`upgrade`](Self::upgrade) guards
    /// keep it terminal.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Sending | Self::Failed => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
        }
    }

    /// Applies a status transition as a monotonic upgrade.
    ///
    /// A `Read` receipt arriving before a `Delivered` receipt leaves the
    /// message at `Read`; a later `Delivered` never regresses it. `Failed`
    /// is reachable from `Sending` only and is terminal.
    #[must_use]
    pub const fn upgrade(self, next: Self) -> Self {
        match (self, next) {
            (Self::Failed, _) => Self::Failed,
            (Self::Sending, Self::Failed) => Self::Failed,
            // A failure signal after server confirmation is stale; ignore it.
            (_, Self::Failed) => self,
            _ => {
                if next.rank() > self.rank() {
                    next
                } else {
                    self
                }
            }
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Read => write!(f, "read"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
