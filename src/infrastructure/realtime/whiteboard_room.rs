use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::ports::document_store::DocumentStore;
use crate::application::ports::whiteboard_cache::WhiteboardCache;
use crate::domain::documents::{CanvasObject, DocumentKind, ViewObject};

use super::room::{
    ClientHandle, ClientId, ClientSet, FrameKind, Inbound, RoomChannels, RoomHandle,
    room_channels,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WhiteboardMessage {
    /// Server to client only: full replay of both object maps.
    Init {
        canvas_objects: HashMap<String, CanvasObject>,
        view_objects: HashMap<String, ViewObject>,
    },
    AddCanvasObject { object: CanvasObject },
    UpdateCanvasObject { object: CanvasObject },
    DeleteCanvasObject { id: String },
    AddViewObject { object: ViewObject },
    UpdateViewObject { object: ViewObject },
    DeleteViewObject { id: String },
    ClearAll,
}

/// Durable shape of `view.data` for whiteboards; also what the persister
/// writes back.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WhiteboardState {
    #[serde(default)]
    pub canvas_objects: HashMap<String, CanvasObject>,
    #[serde(default)]
    pub view_objects: HashMap<String, ViewObject>,
}

pub struct WhiteboardRoom {
    view_id: String,
    cache: Arc<dyn WhiteboardCache>,
    store: Arc<dyn DocumentStore>,
    clients: ClientSet,
}

impl WhiteboardRoom {
    pub fn spawn(
        view_id: String,
        cache: Arc<dyn WhiteboardCache>,
        store: Arc<dyn DocumentStore>,
    ) -> RoomHandle {
        let (handle, channels) = room_channels(FrameKind::Text);
        let room = Self {
            view_id,
            cache,
            store,
            clients: ClientSet::new(handle.client_counter()),
        };
        tokio::spawn(room.run(channels));
        handle
    }

    async fn run(mut self, mut channels: RoomChannels) {
        loop {
            tokio::select! {
                _ = channels.cancel.cancelled() => {
                    self.clients.drain();
                    tracing::info!(document_id = %self.view_id, "room_stopped");
                    return;
                }
                Some(client) = channels.register_rx.recv() => self.on_register(client),
                Some(id) = channels.unregister_rx.recv() => self.on_unregister(id),
                Some(message) = channels.broadcast_rx.recv() => self.on_message(message).await,
                else => return,
            }
        }
    }

    fn on_register(&mut self, client: ClientHandle) {
        tracing::info!(
            document_id = %self.view_id,
            user_id = %client.user_id,
            user_name = %client.user_name,
            clients = self.clients.len() + 1,
            "client_joined_room"
        );
        self.spawn_initial_state(&client);
        self.clients.insert(client);
    }

    fn on_unregister(&mut self, id: ClientId) {
        if let Some(client) = self.clients.remove(id) {
            tracing::info!(
                document_id = %self.view_id,
                user_id = %client.user_id,
                clients = self.clients.len(),
                "client_left_room"
            );
        }
    }

    fn spawn_initial_state(&self, client: &ClientHandle) {
        let cache = self.cache.clone();
        let store = self.store.clone();
        let view_id = self.view_id.clone();
        let tx = client.tx.clone();
        tokio::spawn(async move {
            if let Err(e) = hydrate_if_needed(&cache, &store, &view_id).await {
                tracing::warn!(document_id = %view_id, error = ?e, "whiteboard_hydrate_failed");
            }

            let canvas_objects = match cache.canvas_objects(&view_id).await {
                Ok(objects) => objects,
                Err(e) => {
                    tracing::warn!(document_id = %view_id, error = ?e, "load_canvas_objects_failed");
                    HashMap::new()
                }
            };
            let view_objects = match cache.view_objects(&view_id).await {
                Ok(objects) => objects,
                Err(e) => {
                    tracing::warn!(document_id = %view_id, error = ?e, "load_view_objects_failed");
                    HashMap::new()
                }
            };

            let init = WhiteboardMessage::Init {
                canvas_objects,
                view_objects,
            };
            match serde_json::to_vec(&init) {
                Ok(frame) => {
                    let _ = tx.send(frame).await;
                }
                Err(e) => {
                    tracing::error!(document_id = %view_id, error = %e, "encode_init_frame_failed");
                }
            }
        });
    }

    async fn on_message(&mut self, message: Inbound) {
        let Some(sender) = self.clients.get(message.sender) else {
            return;
        };
        if sender.read_only {
            tracing::debug!(
                document_id = %self.view_id,
                user_id = %sender.user_id,
                "dropping_mutation_from_read_only_client"
            );
            return;
        }

        let parsed: WhiteboardMessage = match serde_json::from_slice(&message.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(document_id = %self.view_id, error = %e, "malformed_whiteboard_message");
                return;
            }
        };

        match &parsed {
            WhiteboardMessage::Init { .. } => {
                tracing::debug!(document_id = %self.view_id, "ignoring_client_init_frame");
                return;
            }
            WhiteboardMessage::AddCanvasObject { object }
            | WhiteboardMessage::UpdateCanvasObject { object } => {
                if let Err(e) = self.cache.set_canvas_object(&self.view_id, object).await {
                    tracing::warn!(document_id = %self.view_id, error = ?e, "store_canvas_object_failed");
                }
            }
            WhiteboardMessage::DeleteCanvasObject { id } => {
                if let Err(e) = self.cache.delete_canvas_object(&self.view_id, id).await {
                    tracing::warn!(document_id = %self.view_id, error = ?e, "delete_canvas_object_failed");
                }
            }
            WhiteboardMessage::AddViewObject { object }
            | WhiteboardMessage::UpdateViewObject { object } => {
                if let Err(e) = self.cache.set_view_object(&self.view_id, object).await {
                    tracing::warn!(document_id = %self.view_id, error = ?e, "store_view_object_failed");
                }
            }
            WhiteboardMessage::DeleteViewObject { id } => {
                if let Err(e) = self.cache.delete_view_object(&self.view_id, id).await {
                    tracing::warn!(document_id = %self.view_id, error = ?e, "delete_view_object_failed");
                }
            }
            WhiteboardMessage::ClearAll => {
                if let Err(e) = self.cache.clear_canvas_objects(&self.view_id).await {
                    tracing::warn!(document_id = %self.view_id, error = ?e, "clear_canvas_objects_failed");
                }
                if let Err(e) = self.cache.clear_view_objects(&self.view_id).await {
                    tracing::warn!(document_id = %self.view_id, error = ?e, "clear_view_objects_failed");
                }
            }
        }

        self.clients.fan_out(&self.view_id, message.sender, &message.data);

        if let Err(e) = self.cache.refresh_ttl(&self.view_id).await {
            tracing::warn!(document_id = %self.view_id, error = ?e, "refresh_ttl_failed");
        }
    }
}

/// One-shot cache bootstrap from the durable record, gated by the
/// distributed init lock so concurrent joiners (and peer processes) do it
/// exactly once.
async fn hydrate_if_needed(
    cache: &Arc<dyn WhiteboardCache>,
    store: &Arc<dyn DocumentStore>,
    view_id: &str,
) -> anyhow::Result<()> {
    if cache.is_initialized(view_id).await? {
        return Ok(());
    }
    let owner = Uuid::new_v4().to_string();
    if !cache.acquire_init_lock(view_id, &owner).await? {
        return Ok(());
    }

    let hydrate = async {
        let Some(view) = store.find_view(view_id).await? else {
            return Ok(());
        };
        if view.kind != DocumentKind::Whiteboard {
            return Ok(());
        }
        if let Some(data) = view.data.as_deref() {
            let state: WhiteboardState = serde_json::from_str(data).unwrap_or_default();
            for object in state.canvas_objects.values() {
                cache.set_canvas_object(view_id, object).await?;
            }
            for object in state.view_objects.values() {
                cache.set_view_object(view_id, object).await?;
            }
        }
        if let Some(state) = view.yjs_state.as_deref() {
            cache.set_yjs_state(view_id, state).await?;
        }
        cache.mark_initialized(view_id).await?;
        tracing::debug!(document_id = %view_id, "whiteboard_cache_hydrated");
        anyhow::Ok(())
    }
    .await;

    if let Err(e) = cache.release_init_lock(view_id, &owner).await {
        tracing::warn!(document_id = %view_id, error = ?e, "release_init_lock_failed");
    }
    hydrate
}
