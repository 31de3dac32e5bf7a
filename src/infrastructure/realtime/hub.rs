use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::application::ports::document_store::DocumentStore;
use crate::application::ports::note_cache::NoteCache;
use crate::application::ports::spreadsheet_cache::SpreadsheetCache;
use crate::application::ports::view_cache::ViewCache;
use crate::application::ports::whiteboard_cache::WhiteboardCache;
use crate::domain::documents::DocumentKind;

use super::note_room::NoteRoom;
use super::room::RoomHandle;
use super::spreadsheet_room::SpreadsheetRoom;
use super::whiteboard_room::WhiteboardRoom;
use super::yjs_room::YjsRoom;

/// Cadence of the empty-room sweep.
pub const REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Cache handles the hub passes to the rooms it creates.
#[derive(Clone)]
pub struct HubCaches {
    pub view: Arc<dyn ViewCache>,
    pub whiteboard: Arc<dyn WhiteboardCache>,
    pub spreadsheet: Arc<dyn SpreadsheetCache>,
    pub note: Arc<dyn NoteCache>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HubStats {
    pub total_rooms: usize,
    pub total_clients: usize,
    pub rooms: HashMap<String, usize>,
}

/// Process-wide registry of active rooms, keyed by document ID.
#[derive(Clone)]
pub struct Hub {
    rooms: Arc<RwLock<HashMap<String, RoomHandle>>>,
    caches: HubCaches,
    store: Arc<dyn DocumentStore>,
    reaper: CancellationToken,
}

impl Hub {
    pub fn new(
        caches: HubCaches,
        store: Arc<dyn DocumentStore>,
        reap_interval: Duration,
    ) -> Self {
        let hub = Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            caches,
            store,
            reaper: CancellationToken::new(),
        };
        hub.spawn_reaper(reap_interval);
        hub
    }

    /// Returns the room for `document_id`, creating and starting it when
    /// absent. Concurrent callers always observe the same room.
    pub async fn get_or_create(&self, document_id: &str, kind: DocumentKind) -> RoomHandle {
        if let Some(room) = self.rooms.read().await.get(document_id).cloned() {
            return room;
        }

        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(document_id).cloned() {
            return room;
        }

        let room = match kind {
            DocumentKind::Yjs => {
                YjsRoom::spawn(document_id.to_string(), self.caches.view.clone())
            }
            DocumentKind::Whiteboard => WhiteboardRoom::spawn(
                document_id.to_string(),
                self.caches.whiteboard.clone(),
                self.store.clone(),
            ),
            DocumentKind::Spreadsheet => {
                SpreadsheetRoom::spawn(document_id.to_string(), self.caches.spreadsheet.clone())
            }
            DocumentKind::Note => {
                NoteRoom::spawn(document_id.to_string(), self.caches.note.clone())
            }
        };
        tracing::info!(document_id, kind = kind.as_str(), "room_created");
        rooms.insert(document_id.to_string(), room.clone());
        room
    }

    pub async fn get(&self, document_id: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(document_id).cloned()
    }

    /// Stops and removes the room; a no-op when it does not exist.
    pub async fn remove(&self, document_id: &str) {
        if let Some(room) = self.rooms.write().await.remove(document_id) {
            room.stop();
            tracing::info!(document_id, "room_removed");
        }
    }

    /// Point-in-time snapshot; counts may trail the rooms slightly.
    pub async fn stats(&self) -> HubStats {
        let rooms = self.rooms.read().await;
        let mut per_room = HashMap::with_capacity(rooms.len());
        let mut total_clients = 0;
        for (document_id, room) in rooms.iter() {
            let clients = room.client_count();
            total_clients += clients;
            per_room.insert(document_id.clone(), clients);
        }
        HubStats {
            total_rooms: rooms.len(),
            total_clients,
            rooms: per_room,
        }
    }

    /// Stops the reaper, signals every room to stop, and clears the map.
    pub async fn stop(&self) {
        self.reaper.cancel();
        let mut rooms = self.rooms.write().await;
        for (document_id, room) in rooms.drain() {
            room.stop();
            tracing::info!(document_id = %document_id, "room_stopped_by_hub");
        }
    }

    fn spawn_reaper(&self, interval: Duration) {
        let rooms = self.rooms.clone();
        let cancel = self.reaper.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + interval,
                interval,
            );
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let mut rooms = rooms.write().await;
                        rooms.retain(|document_id, room| {
                            if room.client_count() == 0 {
                                room.stop();
                                tracing::info!(document_id = %document_id, "reaped_empty_room");
                                false
                            } else {
                                true
                            }
                        });
                    }
                }
            }
        });
    }
}
