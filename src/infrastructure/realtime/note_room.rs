use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::ports::note_cache::NoteCache;
use crate::domain::documents::NoteData;

use super::room::{
    ClientHandle, ClientId, ClientSet, FrameKind, Inbound, RoomChannels, RoomHandle,
    room_channels,
};

/// Note frames are JSON; Y.js payloads travel base64-encoded inside them.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteMessage {
    /// Server to client only, on join.
    Init {
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<NoteData>,
        #[serde(skip_serializing_if = "Option::is_none")]
        snapshot: Option<String>,
        #[serde(default)]
        updates: Vec<String>,
    },
    UpdateTitle { title: String },
    UpdateContent { content: String },
    YjsUpdate { update: String },
    /// The lock winner posts the consolidated document state back; the room
    /// stores it, clears the pending updates, and releases the lock.
    Snapshot { snapshot: String },
    AcquireLock,
    LockAcquired { lock_acquired: bool },
}

pub struct NoteRoom {
    note_id: String,
    cache: Arc<dyn NoteCache>,
    clients: ClientSet,
    snapshot_lock_owner: Option<String>,
}

impl NoteRoom {
    pub fn spawn(note_id: String, cache: Arc<dyn NoteCache>) -> RoomHandle {
        let (handle, channels) = room_channels(FrameKind::Text);
        let room = Self {
            note_id,
            cache,
            clients: ClientSet::new(handle.client_counter()),
            snapshot_lock_owner: None,
        };
        tokio::spawn(room.run(channels));
        handle
    }

    async fn run(mut self, mut channels: RoomChannels) {
        loop {
            tokio::select! {
                _ = channels.cancel.cancelled() => {
                    self.clients.drain();
                    tracing::info!(document_id = %self.note_id, "room_stopped");
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
            document_id = %self.note_id,
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
                document_id = %self.note_id,
                user_id = %client.user_id,
                clients = self.clients.len(),
                "client_left_room"
            );
        }
    }

    fn spawn_initial_state(&self, client: &ClientHandle) {
        let cache = self.cache.clone();
        let note_id = self.note_id.clone();
        let tx = client.tx.clone();
        tokio::spawn(async move {
            let note = match cache.note_data(&note_id).await {
                Ok(note) => note,
                Err(e) => {
                    tracing::warn!(document_id = %note_id, error = ?e, "load_note_data_failed");
                    None
                }
            };
            let snapshot = match cache.yjs_snapshot(&note_id).await {
                Ok(snapshot) => snapshot.map(|bytes| BASE64.encode(bytes)),
                Err(e) => {
                    tracing::warn!(document_id = %note_id, error = ?e, "load_yjs_snapshot_failed");
                    None
                }
            };
            let updates = match cache.yjs_updates(&note_id).await {
                Ok(updates) => updates.iter().map(|bytes| BASE64.encode(bytes)).collect(),
                Err(e) => {
                    tracing::warn!(document_id = %note_id, error = ?e, "load_yjs_updates_failed");
                    Vec::new()
                }
            };

            let init = NoteMessage::Init {
                note,
                snapshot,
                updates,
            };
            match serde_json::to_vec(&init) {
                Ok(frame) => {
                    let _ = tx.send(frame).await;
                }
                Err(e) => {
                    tracing::error!(document_id = %note_id, error = %e, "encode_init_frame_failed");
                }
            }
        });
    }

    async fn on_message(&mut self, message: Inbound) {
        let Some(sender) = self.clients.get(message.sender) else {
            return;
        };
        let read_only = sender.read_only;
        let sender_user = sender.user_id.clone();

        let parsed: NoteMessage = match serde_json::from_slice(&message.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(document_id = %self.note_id, error = %e, "malformed_note_message");
                return;
            }
        };

        if read_only && !matches!(parsed, NoteMessage::AcquireLock) {
            tracing::debug!(
                document_id = %self.note_id,
                user_id = %sender_user,
                "dropping_mutation_from_read_only_client"
            );
            return;
        }

        match parsed {
            NoteMessage::UpdateTitle { ref title } => {
                if let Err(e) = self.cache.update_title(&self.note_id, title, &sender_user).await
                {
                    tracing::warn!(document_id = %self.note_id, error = ?e, "update_title_failed");
                }
                self.clients.fan_out(&self.note_id, message.sender, &message.data);
            }
            NoteMessage::UpdateContent { ref content } => {
                if let Err(e) = self
                    .cache
                    .update_content(&self.note_id, content, &sender_user)
                    .await
                {
                    tracing::warn!(document_id = %self.note_id, error = ?e, "update_content_failed");
                }
                self.clients.fan_out(&self.note_id, message.sender, &message.data);
            }
            NoteMessage::YjsUpdate { ref update } => {
                let Ok(bytes) = BASE64.decode(update) else {
                    tracing::warn!(document_id = %self.note_id, "undecodable_yjs_update_payload");
                    return;
                };
                if let Err(e) = self.cache.append_yjs_update(&self.note_id, &bytes).await {
                    tracing::warn!(document_id = %self.note_id, error = ?e, "append_yjs_update_failed");
                }
                self.clients.fan_out(&self.note_id, message.sender, &message.data);
            }
            NoteMessage::Snapshot { ref snapshot } => {
                let Ok(bytes) = BASE64.decode(snapshot) else {
                    tracing::warn!(document_id = %self.note_id, "undecodable_snapshot_payload");
                    return;
                };
                if let Err(e) = self.cache.set_yjs_snapshot(&self.note_id, &bytes).await {
                    tracing::warn!(document_id = %self.note_id, error = ?e, "store_snapshot_failed");
                }
                if let Err(e) = self.cache.clear_yjs_updates(&self.note_id).await {
                    tracing::warn!(document_id = %self.note_id, error = ?e, "clear_yjs_updates_failed");
                }
                if let Some(owner) = self.snapshot_lock_owner.take() {
                    if let Err(e) = self.cache.release_snapshot_lock(&self.note_id, &owner).await
                    {
                        tracing::warn!(document_id = %self.note_id, error = ?e, "release_snapshot_lock_failed");
                    }
                }
                tracing::info!(
                    document_id = %self.note_id,
                    user_id = %sender_user,
                    "note_snapshot_stored"
                );
                self.clients.fan_out(&self.note_id, message.sender, &message.data);
            }
            NoteMessage::AcquireLock => {
                let acquired = if read_only {
                    false
                } else {
                    self.try_acquire_snapshot_lock().await
                };
                self.reply_lock_result(message.sender, acquired);
            }
            NoteMessage::Init { .. } | NoteMessage::LockAcquired { .. } => {
                tracing::debug!(document_id = %self.note_id, "ignoring_server_only_frame_from_client");
                return;
            }
        }

        if let Err(e) = self.cache.refresh_ttl(&self.note_id).await {
            tracing::warn!(document_id = %self.note_id, error = ?e, "refresh_ttl_failed");
        }
    }

    async fn try_acquire_snapshot_lock(&mut self) -> bool {
        let owner = Uuid::new_v4().to_string();
        match self.cache.acquire_snapshot_lock(&self.note_id, &owner).await {
            Ok(true) => {
                self.snapshot_lock_owner = Some(owner);
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(document_id = %self.note_id, error = ?e, "acquire_snapshot_lock_failed");
                false
            }
        }
    }

    fn reply_lock_result(&mut self, target: ClientId, acquired: bool) {
        let response = NoteMessage::LockAcquired {
            lock_acquired: acquired,
        };
        match serde_json::to_vec(&response) {
            Ok(frame) => self.clients.reply(&self.note_id, target, frame),
            Err(e) => {
                tracing::error!(document_id = %self.note_id, error = %e, "encode_lock_reply_failed");
            }
        }
    }
}
