use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::ports::spreadsheet_cache::SpreadsheetCache;

use super::room::{
    ClientHandle, ClientId, ClientSet, FrameKind, Inbound, RoomChannels, RoomHandle,
    room_channels,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpreadsheetMessage {
    /// Server to client only, on join.
    Init {
        #[serde(skip_serializing_if = "Option::is_none")]
        sheets: Option<serde_json::Value>,
        initialized: bool,
    },
    AcquireLock,
    LockAcquired { lock_acquired: bool },
    InitializeData {
        #[serde(skip_serializing_if = "Option::is_none")]
        sheets: Option<serde_json::Value>,
    },
    Op {
        #[serde(skip_serializing_if = "Option::is_none")]
        ops: Option<serde_json::Value>,
    },
    /// Full-state refresh: replaces the cached sheets and clears the op
    /// backlog.
    Sync {
        #[serde(skip_serializing_if = "Option::is_none")]
        sheets: Option<serde_json::Value>,
    },
}

pub struct SpreadsheetRoom {
    view_id: String,
    cache: Arc<dyn SpreadsheetCache>,
    clients: ClientSet,
    /// Token for the init lock we hold on behalf of the winning client.
    init_lock_owner: Option<String>,
}

impl SpreadsheetRoom {
    pub fn spawn(view_id: String, cache: Arc<dyn SpreadsheetCache>) -> RoomHandle {
        let (handle, channels) = room_channels(FrameKind::Text);
        let room = Self {
            view_id,
            cache,
            clients: ClientSet::new(handle.client_counter()),
            init_lock_owner: None,
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
        let view_id = self.view_id.clone();
        let tx = client.tx.clone();
        tokio::spawn(async move {
            let initialized = match cache.sheets_exist(&view_id).await {
                Ok(initialized) => initialized,
                Err(e) => {
                    tracing::warn!(document_id = %view_id, error = ?e, "check_initialized_failed");
                    false
                }
            };
            let sheets = if initialized {
                match cache.sheets(&view_id).await {
                    Ok(sheets) => sheets.and_then(|raw| serde_json::from_str(&raw).ok()),
                    Err(e) => {
                        tracing::warn!(document_id = %view_id, error = ?e, "load_sheets_failed");
                        None
                    }
                }
            } else {
                None
            };

            let init = SpreadsheetMessage::Init {
                sheets,
                initialized,
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
        let read_only = sender.read_only;
        let sender_user = sender.user_id.clone();

        let parsed: SpreadsheetMessage = match serde_json::from_slice(&message.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(document_id = %self.view_id, error = %e, "malformed_spreadsheet_message");
                return;
            }
        };

        match parsed {
            SpreadsheetMessage::AcquireLock => {
                // Read-only clients may ask; the answer is always no. This
                // keeps the client protocol symmetric.
                let acquired = if read_only {
                    false
                } else {
                    self.try_acquire_init_lock().await
                };
                tracing::debug!(
                    document_id = %self.view_id,
                    user_id = %sender_user,
                    acquired,
                    "init_lock_answered"
                );
                self.reply_lock_result(message.sender, acquired);
            }
            SpreadsheetMessage::InitializeData { ref sheets } => {
                if read_only {
                    tracing::debug!(
                        document_id = %self.view_id,
                        user_id = %sender_user,
                        "dropping_mutation_from_read_only_client"
                    );
                    return;
                }
                if let Some(sheets) = sheets {
                    if let Err(e) = self.cache.set_sheets(&self.view_id, &sheets.to_string()).await
                    {
                        tracing::warn!(document_id = %self.view_id, error = ?e, "store_sheets_failed");
                    }
                }
                if let Some(owner) = self.init_lock_owner.take() {
                    if let Err(e) = self.cache.release_init_lock(&self.view_id, &owner).await {
                        tracing::warn!(document_id = %self.view_id, error = ?e, "release_init_lock_failed");
                    }
                }
                tracing::info!(
                    document_id = %self.view_id,
                    user_id = %sender_user,
                    "spreadsheet_initialized"
                );
                self.clients.fan_out(&self.view_id, message.sender, &message.data);
            }
            SpreadsheetMessage::Op { ref ops } => {
                if read_only {
                    tracing::debug!(
                        document_id = %self.view_id,
                        user_id = %sender_user,
                        "dropping_mutation_from_read_only_client"
                    );
                    return;
                }
                if let Some(ops) = ops {
                    if let Err(e) = self.cache.append_ops(&self.view_id, &ops.to_string()).await {
                        tracing::warn!(document_id = %self.view_id, error = ?e, "append_ops_failed");
                    }
                }
                self.clients.fan_out(&self.view_id, message.sender, &message.data);
            }
            SpreadsheetMessage::Sync { ref sheets } => {
                if read_only {
                    tracing::debug!(
                        document_id = %self.view_id,
                        user_id = %sender_user,
                        "dropping_mutation_from_read_only_client"
                    );
                    return;
                }
                if let Some(sheets) = sheets {
                    if let Err(e) = self.cache.set_sheets(&self.view_id, &sheets.to_string()).await
                    {
                        tracing::warn!(document_id = %self.view_id, error = ?e, "store_sheets_failed");
                    }
                    if let Err(e) = self.cache.clear_ops(&self.view_id).await {
                        tracing::warn!(document_id = %self.view_id, error = ?e, "clear_ops_failed");
                    }
                }
                self.clients.fan_out(&self.view_id, message.sender, &message.data);
            }
            SpreadsheetMessage::Init { .. } | SpreadsheetMessage::LockAcquired { .. } => {
                tracing::debug!(document_id = %self.view_id, "ignoring_server_only_frame_from_client");
                return;
            }
        }

        if let Err(e) = self.cache.refresh_ttl(&self.view_id).await {
            tracing::warn!(document_id = %self.view_id, error = ?e, "refresh_ttl_failed");
        }
    }

    async fn try_acquire_init_lock(&mut self) -> bool {
        let owner = Uuid::new_v4().to_string();
        match self.cache.acquire_init_lock(&self.view_id, &owner).await {
            Ok(true) => {
                self.init_lock_owner = Some(owner);
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(document_id = %self.view_id, error = ?e, "acquire_init_lock_failed");
                false
            }
        }
    }

    fn reply_lock_result(&mut self, target: ClientId, acquired: bool) {
        let response = SpreadsheetMessage::LockAcquired {
            lock_acquired: acquired,
        };
        match serde_json::to_vec(&response) {
            Ok(frame) => self.clients.reply(&self.view_id, target, frame),
            Err(e) => {
                tracing::error!(document_id = %self.view_id, error = %e, "encode_lock_reply_failed");
            }
        }
    }
}
