use async_trait::async_trait;

/// Sheets are an opaque JSON document supplied by the client; ops are the
/// JSON-encoded mutations buffered since the last full sync.
#[async_trait]
pub trait SpreadsheetCache: Send + Sync {
    async fn sheets(&self, view_id: &str) -> anyhow::Result<Option<String>>;

    async fn set_sheets(&self, view_id: &str, sheets: &str) -> anyhow::Result<()>;

    async fn sheets_exist(&self, view_id: &str) -> anyhow::Result<bool>;

    async fn append_ops(&self, view_id: &str, ops: &str) -> anyhow::Result<()>;

    async fn ops(&self, view_id: &str) -> anyhow::Result<Vec<String>>;

    async fn clear_ops(&self, view_id: &str) -> anyhow::Result<()>;

    async fn acquire_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<bool>;

    async fn release_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<()>;

    async fn refresh_ttl(&self, view_id: &str) -> anyhow::Result<()>;

    async fn list_active(&self) -> anyhow::Result<Vec<String>>;
}
