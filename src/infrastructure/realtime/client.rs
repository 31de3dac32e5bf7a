use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::room::{ClientHandle, ClientId, FrameKind, Inbound, RoomHandle, SEND_QUEUE_CAPACITY};

/// Time allowed to write a frame to the peer.
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between inbound frames (pongs included) before the read
/// side gives up.
const PONG_WAIT: Duration = Duration::from_secs(60);

/// Ping cadence; must stay under `PONG_WAIT`.
const PING_PERIOD: Duration = Duration::from_secs(54);

/// Maximum inbound frame size, enforced at upgrade time.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Who is on the other end of the socket, as asserted by the HTTP edge.
/// The realtime core does not re-authenticate (the edge already did).
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub user_id: String,
    pub user_name: String,
    pub read_only: bool,
}

/// Runs one client: registers with the room, pumps the socket in both
/// directions, and unregisters when the read side ends.
pub async fn serve(socket: WebSocket, identity: ClientIdentity, room: RoomHandle) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::channel::<Vec<u8>>(SEND_QUEUE_CAPACITY);
    room.register(ClientHandle {
        id: client_id,
        user_id: identity.user_id.clone(),
        user_name: identity.user_name.clone(),
        read_only: identity.read_only,
        tx,
    })
    .await;

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_pump(sink, rx, room.frame_kind()));
    read_pump(stream, &room, client_id).await;

    room.unregister(client_id).await;
    // Unregistering drops the room's sender, which closes the queue and
    // lets the write pump finish with a close frame.
    let _ = writer.await;
}

async fn read_pump(mut stream: SplitStream<WebSocket>, room: &RoomHandle, client_id: ClientId) {
    loop {
        match tokio::time::timeout(PONG_WAIT, stream.next()).await {
            Err(_) => {
                tracing::debug!(client_id, "read_deadline_exceeded");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                tracing::debug!(client_id, error = %e, "websocket_read_failed");
                return;
            }
            Ok(Some(Ok(message))) => match message {
                Message::Binary(data) => {
                    room.broadcast(Inbound {
                        sender: client_id,
                        data,
                    })
                    .await;
                }
                Message::Text(text) => {
                    room.broadcast(Inbound {
                        sender: client_id,
                        data: text.into_bytes(),
                    })
                    .await;
                }
                // Any traffic counts as liveness; the deadline re-arms on
                // the next loop iteration.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => return,
            },
        }
    }
}

async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Vec<u8>>,
    frame_kind: FrameKind,
) {
    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + PING_PERIOD, PING_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(frame) => {
                    let ok = match frame_kind {
                        FrameKind::Binary => {
                            // Coalesce whatever is queued into one frame;
                            // concatenated Y.js updates stay decodable.
                            let mut buf = frame;
                            while let Ok(next) = rx.try_recv() {
                                buf.extend_from_slice(&next);
                            }
                            send_frame(&mut sink, Message::Binary(buf)).await
                        }
                        FrameKind::Text => send_text(&mut sink, frame).await,
                    };
                    if !ok {
                        return;
                    }
                }
                None => {
                    // The room closed the queue.
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
            _ = ticker.tick() => {
                if !send_frame(&mut sink, Message::Ping(Vec::new())).await {
                    return;
                }
            }
        }
    }
}

async fn send_text(sink: &mut SplitSink<WebSocket, Message>, frame: Vec<u8>) -> bool {
    match String::from_utf8(frame) {
        Ok(text) => send_frame(sink, Message::Text(text)).await,
        Err(e) => {
            tracing::debug!(error = %e, "dropping_non_utf8_text_frame");
            true
        }
    }
}

async fn send_frame(sink: &mut SplitSink<WebSocket, Message>, message: Message) -> bool {
    matches!(
        tokio::time::timeout(WRITE_WAIT, sink.send(message)).await,
        Ok(Ok(()))
    )
}
