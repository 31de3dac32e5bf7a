use async_trait::async_trait;

/// Cached authoritative state for a Y.js view: a consolidated state update
/// plus the list of incremental updates received since it was cut.
#[async_trait]
pub trait ViewCache: Send + Sync {
    /// Consolidated Y.js state, if one has been cut yet.
    async fn yjs_state(&self, view_id: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn set_yjs_state(&self, view_id: &str, state: &[u8]) -> anyhow::Result<()>;

    async fn yjs_updates(&self, view_id: &str) -> anyhow::Result<Vec<Vec<u8>>>;

    async fn append_yjs_update(&self, view_id: &str, update: &[u8]) -> anyhow::Result<()>;

    /// Drop the first `count` entries of the update list. Used after those
    /// entries have been folded into the consolidated state, so updates
    /// appended concurrently are never lost.
    async fn trim_yjs_updates(&self, view_id: &str, count: usize) -> anyhow::Result<()>;

    /// `SET key owner NX EX ttl`; true when this owner acquired the lock.
    async fn acquire_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<bool>;

    /// Owner-guarded delete: a non-owner call leaves the lock untouched.
    async fn release_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<()>;

    async fn refresh_ttl(&self, view_id: &str) -> anyhow::Result<()>;

    /// View IDs with pending updates, discovered by key scan.
    async fn list_active(&self) -> anyhow::Result<Vec<String>>;
}
