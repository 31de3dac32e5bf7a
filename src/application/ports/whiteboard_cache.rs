use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::documents::{CanvasObject, ViewObject};

#[async_trait]
pub trait WhiteboardCache: Send + Sync {
    async fn canvas_objects(&self, view_id: &str)
    -> anyhow::Result<HashMap<String, CanvasObject>>;

    async fn set_canvas_object(&self, view_id: &str, object: &CanvasObject)
    -> anyhow::Result<()>;

    async fn delete_canvas_object(&self, view_id: &str, object_id: &str) -> anyhow::Result<()>;

    async fn clear_canvas_objects(&self, view_id: &str) -> anyhow::Result<()>;

    async fn view_objects(&self, view_id: &str) -> anyhow::Result<HashMap<String, ViewObject>>;

    async fn set_view_object(&self, view_id: &str, object: &ViewObject) -> anyhow::Result<()>;

    async fn delete_view_object(&self, view_id: &str, object_id: &str) -> anyhow::Result<()>;

    async fn clear_view_objects(&self, view_id: &str) -> anyhow::Result<()>;

    /// Consolidated Y.js state for the canvas. The REST edge seeds it;
    /// the realtime core preserves, TTL-refreshes, and persists it.
    async fn yjs_state(&self, view_id: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn set_yjs_state(&self, view_id: &str, state: &[u8]) -> anyhow::Result<()>;

    /// True when either object hash exists.
    async fn is_initialized(&self, view_id: &str) -> anyhow::Result<bool>;

    /// Seed both hashes (marker field only) so `is_initialized` flips.
    async fn mark_initialized(&self, view_id: &str) -> anyhow::Result<()>;

    async fn acquire_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<bool>;

    async fn release_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<()>;

    async fn refresh_ttl(&self, view_id: &str) -> anyhow::Result<()>;

    async fn list_active(&self) -> anyhow::Result<Vec<String>>;
}
