//! Scenario tests for the client-side conversation store, driving it
//! purely through the hub event funnel the way a live socket would.
//!
//! Verifies:
//! 1. The full lifecycle of a send: optimistic bubble, confirm, delivered
//!    receipt, read receipt.
//! 2. A replayed event stream after reconnect leaves the store unchanged.
//! 3. Receipts arriving out of order never regress status.
//! 4. Interleaved sends from both sides keep display order.
//! 5. Group confirms and pushes flow through the same funnel.

use pulse_client::store::ConversationStore;
use pulse_proto::event::ServerEvent;
use pulse_proto::ids::{GroupId, MessageId, SessionId, TempId, UserId};
use pulse_proto::message::{ChatMessage, DeliveryStatus, Scope, Timestamp};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn session_message(sender: &str, content: &str, created_at: u64) -> ChatMessage {
    ChatMessage {
        id: MessageId::new(),
        scope: Scope::Session(SessionId::new("s1")),
        sender: Some(UserId::new(sender)),
        content: content.into(),
        reply_to: None,
        attachments: Vec::new(),
        created_at: Timestamp::from_millis(created_at),
        delivered_at: None,
        read_at: None,
    }
}

fn group_message(sender: &str, content: &str, created_at: u64) -> ChatMessage {
    ChatMessage {
        scope: Scope::Group(GroupId::new("g1")),
        ..session_message(sender, content, created_at)
    }
}

fn confirm(temp_id: &TempId, message: &ChatMessage) -> ServerEvent {
    ServerEvent::MessageConfirm {
        session_id: SessionId::new("s1"),
        temp_id: temp_id.clone(),
        message: message.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn send_lifecycle_walks_the_status_ladder() {
    let mut store = ConversationStore::new();
    let temp = TempId::generate();
    store.add_optimistic(temp.clone(), session_message("alice", "hello", 100));

    let server = session_message("alice", "hello", 104);
    let id = server.id.clone();
    store.apply(confirm(&temp, &server));
    assert_eq!(store.status_of(&id), Some(DeliveryStatus::Sent));

    store.apply(ServerEvent::MessageDelivered {
        message_id: id.clone(),
        delivered_at: Timestamp::from_millis(110),
    });
    assert_eq!(store.status_of(&id), Some(DeliveryStatus::Delivered));

    store.apply(ServerEvent::MessageRead {
        message_ids: vec![id.clone()],
        read_at: Timestamp::from_millis(130),
    });

    let entry = store.get(&id).unwrap();
    assert_eq!(entry.status, DeliveryStatus::Read);
    assert_eq!(entry.message.delivered_at, Some(Timestamp::from_millis(110)));
    assert_eq!(entry.message.read_at, Some(Timestamp::from_millis(130)));
    assert_eq!(entry.temp_id, Some(temp));
}

#[test]
fn replayed_stream_after_reconnect_is_a_no_op() {
    let mut store = ConversationStore::new();
    let temp = TempId::generate();
    store.add_optimistic(temp.clone(), session_message("alice", "hello", 100));

    let server = session_message("alice", "hello", 104);
    let incoming = session_message("bob", "hey back", 120);
    let stream = vec![
        confirm(&temp, &server),
        ServerEvent::MessageNew {
            session_id: SessionId::new("s1"),
            message: incoming.clone(),
        },
        ServerEvent::MessageDelivered {
            message_id: server.id.clone(),
            delivered_at: Timestamp::from_millis(110),
        },
        ServerEvent::MessageRead {
            message_ids: vec![server.id.clone()],
            read_at: Timestamp::from_millis(130),
        },
    ];

    for event in &stream {
        store.apply(event.clone());
    }
    let snapshot: Vec<_> = store.messages().to_vec();

    // Reconnect: the hub replays everything it has.
    for event in stream {
        store.apply(event);
    }
    assert_eq!(store.messages(), snapshot.as_slice());
}

#[test]
fn read_receipt_before_delivered_receipt_sticks_at_read() {
    let mut store = ConversationStore::new();
    let temp = TempId::generate();
    store.add_optimistic(temp.clone(), session_message("alice", "hello", 100));
    let server = session_message("alice", "hello", 104);
    let id = server.id.clone();
    store.apply(confirm(&temp, &server));

    store.apply(ServerEvent::MessageRead {
        message_ids: vec![id.clone()],
        read_at: Timestamp::from_millis(130),
    });
    store.apply(ServerEvent::MessageDelivered {
        message_id: id.clone(),
        delivered_at: Timestamp::from_millis(110),
    });

    let entry = store.get(&id).unwrap();
    assert_eq!(entry.status, DeliveryStatus::Read);
    assert_eq!(entry.message.delivered_at, Some(Timestamp::from_millis(110)));
}

#[test]
fn failed_send_stays_failed_through_late_receipts() {
    let mut store = ConversationStore::new();
    let temp = TempId::generate();
    store.add_optimistic(temp.clone(), session_message("alice", "hello", 100));
    store.mark_failed(&temp);

    let id = store.messages()[0].message.id.clone();
    store.apply(ServerEvent::MessageDelivered {
        message_id: id.clone(),
        delivered_at: Timestamp::from_millis(110),
    });
    store.apply(ServerEvent::MessageRead {
        message_ids: vec![id.clone()],
        read_at: Timestamp::from_millis(130),
    });
    assert_eq!(store.status_of(&id), Some(DeliveryStatus::Failed));
}

#[test]
fn interleaved_sends_keep_display_order() {
    let mut store = ConversationStore::new();
    let temp = TempId::generate();
    store.add_optimistic(temp.clone(), session_message("alice", "one", 100));

    // Bob's reply lands before our confirm does.
    store.apply(ServerEvent::MessageNew {
        session_id: SessionId::new("s1"),
        message: session_message("bob", "two", 150),
    });
    store.apply(confirm(&temp, &session_message("alice", "one", 103)));
    store.apply(ServerEvent::MessageNew {
        session_id: SessionId::new("s1"),
        message: session_message("bob", "three", 200),
    });

    let order: Vec<&str> = store
        .messages()
        .iter()
        .map(|m| m.message.content.as_str())
        .collect();
    assert_eq!(order, vec!["one", "two", "three"]);
}

#[test]
fn group_events_flow_through_the_same_funnel() {
    let mut store = ConversationStore::new();
    let temp = TempId::generate();
    store.add_optimistic(temp.clone(), group_message("alice", "hi group", 100));

    let server = group_message("alice", "hi group", 104);
    let id = server.id.clone();
    store.apply(ServerEvent::GroupMessageConfirm {
        group_id: GroupId::new("g1"),
        temp_id: temp,
        message: server,
    });
    assert_eq!(store.status_of(&id), Some(DeliveryStatus::Sent));

    let from_peer = group_message("carol", "hello", 150);
    store.apply(ServerEvent::GroupMessageNew {
        group_id: GroupId::new("g1"),
        message: from_peer.clone(),
    });
    assert_eq!(store.messages().len(), 2);
    assert_eq!(
        store.status_of(&from_peer.id),
        Some(DeliveryStatus::Delivered)
    );
}

#[test]
fn ai_group_message_without_sender_is_tracked() {
    let mut store = ConversationStore::new();
    let message = ChatMessage {
        sender: None,
        ..group_message("unused", "summary ready", 100)
    };
    store.apply(ServerEvent::GroupMessageNew {
        group_id: GroupId::new("g1"),
        message: message.clone(),
    });
    let entry = store.get(&message.id).unwrap();
    assert!(entry.message.sender.is_none());
    assert_eq!(entry.status, DeliveryStatus::Delivered);
}
