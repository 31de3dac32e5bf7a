use async_trait::async_trait;

use crate::domain::documents::NoteData;

#[async_trait]
pub trait NoteCache: Send + Sync {
    async fn note_data(&self, note_id: &str) -> anyhow::Result<Option<NoteData>>;

    async fn set_note_data(&self, note_id: &str, data: &NoteData) -> anyhow::Result<()>;

    async fn update_title(&self, note_id: &str, title: &str, updated_by: &str)
    -> anyhow::Result<()>;

    async fn update_content(
        &self,
        note_id: &str,
        content: &str,
        updated_by: &str,
    ) -> anyhow::Result<()>;

    async fn yjs_snapshot(&self, note_id: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn set_yjs_snapshot(&self, note_id: &str, snapshot: &[u8]) -> anyhow::Result<()>;

    async fn has_yjs_snapshot(&self, note_id: &str) -> anyhow::Result<bool>;

    async fn yjs_updates(&self, note_id: &str) -> anyhow::Result<Vec<Vec<u8>>>;

    async fn append_yjs_update(&self, note_id: &str, update: &[u8]) -> anyhow::Result<()>;

    async fn clear_yjs_updates(&self, note_id: &str) -> anyhow::Result<()>;

    async fn acquire_snapshot_lock(&self, note_id: &str, owner: &str) -> anyhow::Result<bool>;

    async fn release_snapshot_lock(&self, note_id: &str, owner: &str) -> anyhow::Result<()>;

    async fn refresh_ttl(&self, note_id: &str) -> anyhow::Result<()>;

    async fn list_active(&self) -> anyhow::Result<Vec<String>>;
}
