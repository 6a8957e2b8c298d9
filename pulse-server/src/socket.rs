//! WebSocket transport: connection handshake, frame pumps, and the server
//! entry points.
//!
//! Each upgraded socket must open with a `Hello` frame carrying a non-empty
//! user id; anything else closes the connection. After the handshake the
//! socket splits into a writer task (drains the connection's event channel,
//! encoding each event to a binary frame) and a reader task (decodes client
//! frames and hands them to the realtime service). Whichever side finishes
//! first aborts the other and the connection is torn down.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use pulse_proto::codec;
use pulse_proto::event::ClientEvent;
use pulse_proto::ids::UserId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::realtime::Realtime;
use crate::store::ChatStore;

/// Handles an upgraded WebSocket connection.
///
/// Lifecycle: wait for `Hello`, register the connection with the service,
/// pump frames both ways, and disconnect on teardown.
pub async fn handle_socket<S: ChatStore + 'static>(socket: WebSocket, service: Arc<Realtime<S>>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(user_id) = wait_for_hello(&mut ws_receiver).await else {
        tracing::warn!("connection closed before identifying itself");
        return;
    };
    tracing::info!(%user_id, "connection identified");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = service.connect(user_id.clone(), tx).await;

    let writer_user = user_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let bytes = match codec::encode_server(&event) {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::error!(user_id = %writer_user, %error, "failed to encode event");
                    continue;
                }
            };
            if ws_sender.send(Message::Binary(bytes.into())).await.is_err() {
                tracing::warn!(user_id = %writer_user, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_service = Arc::clone(&service);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => match codec::decode_client(&data) {
                    Ok(event) => reader_service.handle_event(conn, event).await,
                    Err(error) => {
                        tracing::warn!(%conn, %error, "malformed client frame");
                        reader_service
                            .error_to(conn, "malformed frame".to_string())
                            .await;
                    }
                },
                Message::Close(_) => {
                    tracing::debug!(%conn, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    service.disconnect(conn).await;
    tracing::info!(%user_id, "connection closed");
}

/// Waits for the first frame, expecting a `Hello` with a non-empty user id.
async fn wait_for_hello(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<UserId> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match codec::decode_client(&data) {
                Ok(ClientEvent::Hello { user_id }) => {
                    if user_id.is_empty() {
                        tracing::warn!("received hello with empty user id");
                        return None;
                    }
                    return Some(user_id);
                }
                Ok(other) => {
                    tracing::warn!(event = ?other, "expected hello, got different frame");
                    return None;
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to decode hello frame");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {
                // Skip ping/pong frames during the handshake.
            }
        }
    }
    None
}

/// Starts the server, returning the bound address and a join handle.
///
/// This is the entry point used by both `main.rs` and test code; binding to
/// port 0 yields an OS-assigned port.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server<S: ChatStore + 'static>(
    addr: &str,
    service: Arc<Realtime<S>>,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler::<S>))
        .with_state(service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app).await {
            tracing::error!(%error, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler<S: ChatStore + 'static>(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(service): axum::extract::State<Arc<Realtime<S>>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, service))
}
