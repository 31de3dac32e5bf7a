use async_trait::async_trait;

use crate::domain::documents::{NoteData, NoteRecord, ViewRecord};

/// Durable store access used by the persisters and the WebSocket edge.
/// All writes are full-field overwrites, so replays are idempotent.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_view(&self, view_id: &str) -> anyhow::Result<Option<ViewRecord>>;

    async fn update_view_data(&self, view_id: &str, data: &str) -> anyhow::Result<()>;

    async fn update_view_yjs_state(&self, view_id: &str, state: &[u8]) -> anyhow::Result<()>;

    async fn find_note(&self, note_id: &str) -> anyhow::Result<Option<NoteRecord>>;

    async fn update_note_fields(&self, note_id: &str, data: &NoteData) -> anyhow::Result<()>;
}
