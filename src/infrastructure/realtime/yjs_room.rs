use std::sync::Arc;

use crate::application::ports::view_cache::ViewCache;

use super::room::{
    ClientHandle, ClientId, ClientSet, FrameKind, Inbound, RoomChannels, RoomHandle,
    room_channels,
};

/// Room for Y.js views. Frames are opaque CRDT update bytes: every inbound
/// frame is appended to the pending-update list and fanned out; replay for
/// a new client is the consolidated state followed by pending updates.
pub struct YjsRoom {
    view_id: String,
    cache: Arc<dyn ViewCache>,
    clients: ClientSet,
}

impl YjsRoom {
    pub fn spawn(view_id: String, cache: Arc<dyn ViewCache>) -> RoomHandle {
        let (handle, channels) = room_channels(FrameKind::Binary);
        let room = Self {
            view_id,
            cache,
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

    /// Replay runs off the room task so a slow joiner cannot stall the loop.
    fn spawn_initial_state(&self, client: &ClientHandle) {
        let cache = self.cache.clone();
        let view_id = self.view_id.clone();
        let tx = client.tx.clone();
        let owner = format!("{}:{}", client.user_id, client.id);
        tokio::spawn(async move {
            match cache.yjs_state(&view_id).await {
                Ok(Some(state)) => {
                    if tx.send(state).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    // Nothing consolidated yet: the winner of the init lock
                    // is expected to push the document bootstrap as its
                    // first update; everyone else just waits for frames.
                    match cache.acquire_init_lock(&view_id, &owner).await {
                        Ok(true) => {
                            tracing::debug!(document_id = %view_id, owner = %owner, "init_lock_acquired");
                        }
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!(document_id = %view_id, error = ?e, "init_lock_attempt_failed");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(document_id = %view_id, error = ?e, "load_yjs_state_failed");
                }
            }
            match cache.yjs_updates(&view_id).await {
                Ok(updates) => {
                    for update in updates {
                        if tx.send(update).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(document_id = %view_id, error = ?e, "load_yjs_updates_failed");
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
                "dropping_update_from_read_only_client"
            );
            return;
        }

        if let Err(e) = self.cache.append_yjs_update(&self.view_id, &message.data).await {
            tracing::warn!(document_id = %self.view_id, error = ?e, "append_yjs_update_failed");
        }

        self.clients.fan_out(&self.view_id, message.sender, &message.data);

        if let Err(e) = self.cache.refresh_ttl(&self.view_id).await {
            tracing::warn!(document_id = %self.view_id, error = ?e, "refresh_ttl_failed");
        }
    }
}
