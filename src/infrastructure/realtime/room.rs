use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outbound queue depth per client; overflow evicts the client.
pub const SEND_QUEUE_CAPACITY: usize = 256;

/// Inbound (broadcast) queue depth per room.
pub const BROADCAST_QUEUE_CAPACITY: usize = 256;

/// Frame encoding used on the wire for a room variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Binary,
    Text,
}

pub type ClientId = u64;

/// Inbound message from one client, forwarded to the owning room.
#[derive(Debug)]
pub struct Inbound {
    pub sender: ClientId,
    pub data: Vec<u8>,
}

/// Room-side view of a connected client. Dropping the handle closes the
/// client's send queue, which makes its write pump exit.
#[derive(Debug)]
pub struct ClientHandle {
    pub id: ClientId,
    pub user_id: String,
    pub user_name: String,
    pub read_only: bool,
    pub tx: mpsc::Sender<Vec<u8>>,
}

/// Cheap cloneable handle to a running room task.
#[derive(Clone)]
pub struct RoomHandle {
    register_tx: mpsc::Sender<ClientHandle>,
    unregister_tx: mpsc::Sender<ClientId>,
    broadcast_tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
    client_count: Arc<AtomicUsize>,
    frame_kind: FrameKind,
}

impl RoomHandle {
    pub async fn register(&self, client: ClientHandle) {
        let _ = self.register_tx.send(client).await;
    }

    pub async fn unregister(&self, id: ClientId) {
        let _ = self.unregister_tx.send(id).await;
    }

    pub async fn broadcast(&self, message: Inbound) {
        let _ = self.broadcast_tx.send(message).await;
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    pub fn frame_kind(&self) -> FrameKind {
        self.frame_kind
    }

    pub(crate) fn client_counter(&self) -> Arc<AtomicUsize> {
        self.client_count.clone()
    }
}

/// Receiving halves of a room's channels, owned by the room task.
pub(crate) struct RoomChannels {
    pub register_rx: mpsc::Receiver<ClientHandle>,
    pub unregister_rx: mpsc::Receiver<ClientId>,
    pub broadcast_rx: mpsc::Receiver<Inbound>,
    pub cancel: CancellationToken,
}

pub(crate) fn room_channels(frame_kind: FrameKind) -> (RoomHandle, RoomChannels) {
    let (register_tx, register_rx) = mpsc::channel(1);
    let (unregister_tx, unregister_rx) = mpsc::channel(1);
    let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_CAPACITY);
    let cancel = CancellationToken::new();
    let handle = RoomHandle {
        register_tx,
        unregister_tx,
        broadcast_tx,
        cancel: cancel.clone(),
        client_count: Arc::new(AtomicUsize::new(0)),
        frame_kind,
    };
    let channels = RoomChannels {
        register_rx,
        unregister_rx,
        broadcast_rx,
        cancel,
    };
    (handle, channels)
}

/// The client set owned by a room task. All mutation happens on the room's
/// own task; the shared counter only mirrors the map size for stats.
pub(crate) struct ClientSet {
    clients: HashMap<ClientId, ClientHandle>,
    count: Arc<AtomicUsize>,
}

impl ClientSet {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        Self {
            clients: HashMap::new(),
            count,
        }
    }

    pub fn insert(&mut self, client: ClientHandle) {
        self.clients.insert(client.id, client);
        self.count.store(self.clients.len(), Ordering::Relaxed);
    }

    pub fn remove(&mut self, id: ClientId) -> Option<ClientHandle> {
        let client = self.clients.remove(&id);
        self.count.store(self.clients.len(), Ordering::Relaxed);
        client
    }

    pub fn get(&self, id: ClientId) -> Option<&ClientHandle> {
        self.clients.get(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Non-blocking push to every peer except the sender. A full queue
    /// evicts that client so a slow peer never stalls the room.
    pub fn fan_out(&mut self, document_id: &str, sender: ClientId, data: &[u8]) {
        let mut evicted = Vec::new();
        for (id, client) in &self.clients {
            if *id == sender {
                continue;
            }
            if client.tx.try_send(data.to_vec()).is_err() {
                evicted.push(*id);
            }
        }
        for id in evicted {
            if let Some(client) = self.remove(id) {
                tracing::warn!(
                    document_id,
                    user_id = %client.user_id,
                    "send_queue_full_evicting_client"
                );
            }
        }
    }

    /// Non-blocking push to a single client (lock replies and the like).
    pub fn reply(&mut self, document_id: &str, target: ClientId, data: Vec<u8>) {
        let Some(client) = self.clients.get(&target) else {
            return;
        };
        if client.tx.try_send(data).is_err() {
            if let Some(client) = self.remove(target) {
                tracing::warn!(
                    document_id,
                    user_id = %client.user_id,
                    "send_queue_full_evicting_client"
                );
            }
        }
    }

    /// Drop every handle, closing all send queues. Used on room shutdown.
    pub fn drain(&mut self) {
        self.clients.clear();
        self.count.store(0, Ordering::Relaxed);
    }
}
