//! Integration tests for group messaging and relay rebroadcasts.
//!
//! Verifies:
//! 1. A group send is confirmed to the sender and fanned out to the other
//!    members of the group room, membership-gated.
//! 2. A completed AI message relayed by one client reaches the other room
//!    members verbatim, without echoing back.
//! 3. Edits, deletes, and task events rebroadcast to the rest of the room.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pulse_proto::codec;
use pulse_proto::event::{ClientEvent, ServerEvent, TaskEventKind};
use pulse_proto::ids::{GroupId, MessageId, TempId, UserId};
use pulse_proto::message::{ChatMessage, Scope, Timestamp};
use pulse_server::realtime::Realtime;
use pulse_server::socket::start_server;
use pulse_server::store::MemoryStore;
use tokio_tungstenite::tungstenite;

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start_hub() -> std::net::SocketAddr {
    let store = MemoryStore::new();
    store
        .add_group(
            GroupId::new("g1"),
            vec![UserId::new("alice"), UserId::new("bob"), UserId::new("carol")],
        )
        .await;
    let service = Realtime::new(Arc::new(store), Duration::from_secs(3));
    let (addr, _handle) = start_server("127.0.0.1:0", service)
        .await
        .expect("failed to start test server");
    addr
}

/// Connect, identify, and join the shared group room.
async fn connect_in_group(addr: std::net::SocketAddr, user: &str) -> Ws {
    let url = format!("ws://{addr}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    send(&mut ws, &ClientEvent::Hello {
        user_id: UserId::new(user),
    })
    .await;
    send(&mut ws, &ClientEvent::GroupJoin {
        group_id: GroupId::new("g1"),
    })
    .await;
    ws
}

/// Round-trip a throwaway group send so everything queued before it on this
/// connection (the join in particular) is known to be processed.
async fn sync_member(ws: &mut Ws) {
    send(ws, &group_send("sync", "t-sync")).await;
    recv_until(ws, |e| matches!(e, ServerEvent::GroupMessageConfirm { .. })).await;
}

async fn send(ws: &mut Ws, event: &ClientEvent) {
    let bytes = codec::encode_client(event).unwrap();
    ws.send(tungstenite::Message::Binary(bytes.into()))
        .await
        .unwrap();
}

async fn recv_until(ws: &mut Ws, matches: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .unwrap();
        if let tungstenite::Message::Binary(data) = msg {
            let event = codec::decode_server(&data).unwrap();
            if matches(&event) {
                return event;
            }
        }
    }
}

async fn assert_silent(ws: &mut Ws, window: Duration, matches: impl Fn(&ServerEvent) -> bool) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let Ok(next) = tokio::time::timeout_at(deadline, ws.next()).await else {
            return;
        };
        let msg = next.expect("connection closed").unwrap();
        if let tungstenite::Message::Binary(data) = msg {
            let event = codec::decode_server(&data).unwrap();
            assert!(!matches(&event), "unexpected event: {event:?}");
        }
    }
}

fn group_send(content: &str, temp: &str) -> ClientEvent {
    ClientEvent::GroupMessageSend {
        group_id: GroupId::new("g1"),
        content: content.into(),
        temp_id: TempId::new(temp),
        reply_to: None,
    }
}

// ---------------------------------------------------------------------------
// Group send tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn group_send_fans_out_to_other_members_only() {
    let addr = start_hub().await;
    let mut alice = connect_in_group(addr, "alice").await;
    let mut bob = connect_in_group(addr, "bob").await;
    let mut carol = connect_in_group(addr, "carol").await;
    sync_member(&mut bob).await;
    sync_member(&mut carol).await;

    send(&mut alice, &group_send("hi all", "t1")).await;

    let confirm = recv_until(&mut alice, |e| {
        matches!(e, ServerEvent::GroupMessageConfirm { message, .. } if message.content == "hi all")
    })
    .await;
    let ServerEvent::GroupMessageConfirm { temp_id, message, .. } = confirm else {
        unreachable!()
    };
    assert_eq!(temp_id, TempId::new("t1"));

    for ws in [&mut bob, &mut carol] {
        let event = recv_until(ws, |e| {
            matches!(e, ServerEvent::GroupMessageNew { message, .. } if message.content == "hi all")
        })
        .await;
        let ServerEvent::GroupMessageNew { message: received, .. } = event else {
            unreachable!()
        };
        assert_eq!(received.id, message.id);
    }

    // The sender never sees the broadcast copy of its own message.
    assert_silent(&mut alice, Duration::from_millis(300), |e| {
        matches!(e, ServerEvent::GroupMessageNew { message, .. } if message.content == "hi all")
    })
    .await;
}

#[tokio::test]
async fn non_member_group_send_is_rejected() {
    let addr = start_hub().await;
    let mut mallory = connect_in_group(addr, "mallory").await;
    let mut bob = connect_in_group(addr, "bob").await;

    send(&mut mallory, &group_send("hello", "t1")).await;

    let event = recv_until(&mut mallory, |e| matches!(e, ServerEvent::Error { .. })).await;
    assert_eq!(
        event,
        ServerEvent::Error {
            message: "not a participant of this conversation".into()
        }
    );
    assert_silent(&mut bob, Duration::from_millis(300), |e| {
        matches!(e, ServerEvent::GroupMessageNew { .. })
    })
    .await;
}

// ---------------------------------------------------------------------------
// Relay tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ai_message_relays_to_peers_verbatim() {
    let addr = start_hub().await;
    let mut alice = connect_in_group(addr, "alice").await;
    let mut bob = connect_in_group(addr, "bob").await;
    sync_member(&mut bob).await;

    let ai_message = ChatMessage {
        id: MessageId::new(),
        scope: Scope::Group(GroupId::new("g1")),
        sender: None,
        content: "Here is the summary you asked for.".into(),
        reply_to: None,
        attachments: Vec::new(),
        created_at: Timestamp::now(),
        delivered_at: None,
        read_at: None,
    };
    send(&mut alice, &ClientEvent::GroupAiMessage {
        group_id: GroupId::new("g1"),
        message: ai_message.clone(),
    })
    .await;

    let event = recv_until(&mut bob, |e| {
        matches!(e, ServerEvent::GroupMessageNew { message, .. } if message.sender.is_none())
    })
    .await;
    let ServerEvent::GroupMessageNew { message, .. } = event else {
        unreachable!()
    };
    assert_eq!(message, ai_message);

    // The relaying client already has the message; no echo.
    assert_silent(&mut alice, Duration::from_millis(300), |e| {
        matches!(e, ServerEvent::GroupMessageNew { message, .. } if message.sender.is_none())
    })
    .await;
}

#[tokio::test]
async fn edit_and_delete_rebroadcast_to_the_room() {
    let addr = start_hub().await;
    let mut alice = connect_in_group(addr, "alice").await;
    let mut bob = connect_in_group(addr, "bob").await;
    sync_member(&mut bob).await;
    let message_id = MessageId::new();
    let edited_at = Timestamp::now();

    send(&mut alice, &ClientEvent::GroupMessageEdit {
        group_id: GroupId::new("g1"),
        message_id: message_id.clone(),
        content: "fixed typo".into(),
        edited_at,
    })
    .await;
    send(&mut alice, &ClientEvent::GroupMessageDelete {
        group_id: GroupId::new("g1"),
        message_id: message_id.clone(),
    })
    .await;

    let edited = recv_until(&mut bob, |e| {
        matches!(e, ServerEvent::GroupMessageEdited { .. })
    })
    .await;
    assert_eq!(
        edited,
        ServerEvent::GroupMessageEdited {
            group_id: GroupId::new("g1"),
            message_id: message_id.clone(),
            content: "fixed typo".into(),
            edited_at,
        }
    );
    let deleted = recv_until(&mut bob, |e| {
        matches!(e, ServerEvent::GroupMessageDeleted { .. })
    })
    .await;
    assert_eq!(
        deleted,
        ServerEvent::GroupMessageDeleted {
            group_id: GroupId::new("g1"),
            message_id,
        }
    );
}

#[tokio::test]
async fn task_events_relay_with_payload_intact() {
    let addr = start_hub().await;
    let mut alice = connect_in_group(addr, "alice").await;
    let mut bob = connect_in_group(addr, "bob").await;
    sync_member(&mut bob).await;
    let payload = vec![0x01, 0x02, 0x03];

    send(&mut alice, &ClientEvent::GroupTask {
        group_id: GroupId::new("g1"),
        kind: TaskEventKind::Completed,
        payload: payload.clone(),
    })
    .await;

    let event = recv_until(&mut bob, |e| matches!(e, ServerEvent::GroupTaskEvent { .. })).await;
    assert_eq!(
        event,
        ServerEvent::GroupTaskEvent {
            group_id: GroupId::new("g1"),
            kind: TaskEventKind::Completed,
            payload,
        }
    );
}

#[tokio::test]
async fn relay_without_joining_the_room_is_rejected() {
    let addr = start_hub().await;
    let url = format!("ws://{addr}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    send(&mut ws, &ClientEvent::Hello {
        user_id: UserId::new("alice"),
    })
    .await;
    // No GroupJoin.

    send(&mut ws, &ClientEvent::GroupMessageDelete {
        group_id: GroupId::new("g1"),
        message_id: MessageId::new(),
    })
    .await;

    let event = recv_until(&mut ws, |e| matches!(e, ServerEvent::Error { .. })).await;
    assert_eq!(
        event,
        ServerEvent::Error {
            message: "not a participant of this conversation".into()
        }
    );
}
