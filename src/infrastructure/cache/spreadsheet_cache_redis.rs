use async_trait::async_trait;
use redis::AsyncCommands;

use crate::application::ports::spreadsheet_cache::SpreadsheetCache;

use super::{CACHE_TTL_SECS, CacheClient, acquire_lock, id_from_key, release_lock, with_timeout};

const INIT_LOCK_TTL_SECS: i64 = 10;

fn sheets_key(view_id: &str) -> String {
    format!("spreadsheet:{view_id}:sheets")
}

fn ops_key(view_id: &str) -> String {
    format!("spreadsheet:{view_id}:ops")
}

fn lock_key(view_id: &str) -> String {
    format!("spreadsheet:{view_id}:init:lock")
}

pub struct RedisSpreadsheetCache {
    client: CacheClient,
}

impl RedisSpreadsheetCache {
    pub fn new(client: CacheClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpreadsheetCache for RedisSpreadsheetCache {
    async fn sheets(&self, view_id: &str) -> anyhow::Result<Option<String>> {
        let key = sheets_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.get(&key)).await
    }

    async fn set_sheets(&self, view_id: &str, sheets: &str) -> anyhow::Result<()> {
        let key = sheets_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.set_ex(&key, sheets, CACHE_TTL_SECS as u64)).await
    }

    async fn sheets_exist(&self, view_id: &str) -> anyhow::Result<bool> {
        let key = sheets_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.exists(&key)).await
    }

    async fn append_ops(&self, view_id: &str, ops: &str) -> anyhow::Result<()> {
        let key = ops_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(async {
            redis::pipe()
                .rpush(&key, ops)
                .ignore()
                .expire(&key, CACHE_TTL_SECS)
                .ignore()
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn ops(&self, view_id: &str) -> anyhow::Result<Vec<String>> {
        let key = ops_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.lrange(&key, 0, -1)).await
    }

    async fn clear_ops(&self, view_id: &str) -> anyhow::Result<()> {
        let key = ops_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.del(&key)).await
    }

    async fn acquire_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<bool> {
        acquire_lock(self.client.conn(), &lock_key(view_id), owner, INIT_LOCK_TTL_SECS).await
    }

    async fn release_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<()> {
        release_lock(self.client.conn(), &lock_key(view_id), owner).await
    }

    async fn refresh_ttl(&self, view_id: &str) -> anyhow::Result<()> {
        let sheets = sheets_key(view_id);
        let ops = ops_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(async {
            redis::pipe()
                .expire(&sheets, CACHE_TTL_SECS)
                .ignore()
                .expire(&ops, CACHE_TTL_SECS)
                .ignore()
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn list_active(&self) -> anyhow::Result<Vec<String>> {
        let mut conn = self.client.conn();
        with_timeout(async {
            let mut ids = Vec::new();
            let mut iter = conn.scan_match::<_, String>("spreadsheet:*:sheets").await?;
            while let Some(key) = iter.next_item().await {
                if let Some(id) = id_from_key(&key, "spreadsheet:", ":sheets") {
                    ids.push(id);
                }
            }
            Ok(ids)
        })
        .await
    }
}
