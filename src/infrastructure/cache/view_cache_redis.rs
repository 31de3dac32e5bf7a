use async_trait::async_trait;
use redis::AsyncCommands;

use crate::application::ports::view_cache::ViewCache;

use super::{CACHE_TTL_SECS, CacheClient, acquire_lock, id_from_key, release_lock, with_timeout};

const INIT_LOCK_TTL_SECS: i64 = 30;

fn state_key(view_id: &str) -> String {
    format!("view:{view_id}:yjsstate")
}

fn updates_key(view_id: &str) -> String {
    format!("view:{view_id}:yjs:updates")
}

fn lock_key(view_id: &str) -> String {
    format!("view:{view_id}:yjs:lock")
}

pub struct RedisViewCache {
    client: CacheClient,
}

impl RedisViewCache {
    pub fn new(client: CacheClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ViewCache for RedisViewCache {
    async fn yjs_state(&self, view_id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let key = state_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.get(&key)).await
    }

    async fn set_yjs_state(&self, view_id: &str, state: &[u8]) -> anyhow::Result<()> {
        let key = state_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.set_ex(&key, state, CACHE_TTL_SECS as u64)).await
    }

    async fn yjs_updates(&self, view_id: &str) -> anyhow::Result<Vec<Vec<u8>>> {
        let key = updates_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.lrange(&key, 0, -1)).await
    }

    async fn append_yjs_update(&self, view_id: &str, update: &[u8]) -> anyhow::Result<()> {
        let key = updates_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(async {
            redis::pipe()
                .rpush(&key, update)
                .ignore()
                .expire(&key, CACHE_TTL_SECS)
                .ignore()
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn trim_yjs_updates(&self, view_id: &str, count: usize) -> anyhow::Result<()> {
        let key = updates_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.ltrim(&key, count as isize, -1)).await
    }

    async fn acquire_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<bool> {
        acquire_lock(self.client.conn(), &lock_key(view_id), owner, INIT_LOCK_TTL_SECS).await
    }

    async fn release_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<()> {
        release_lock(self.client.conn(), &lock_key(view_id), owner).await
    }

    async fn refresh_ttl(&self, view_id: &str) -> anyhow::Result<()> {
        let state = state_key(view_id);
        let updates = updates_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(async {
            redis::pipe()
                .expire(&state, CACHE_TTL_SECS)
                .ignore()
                .expire(&updates, CACHE_TTL_SECS)
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
            let mut iter = conn.scan_match::<_, String>("view:*:yjs:updates").await?;
            while let Some(key) = iter.next_item().await {
                if let Some(id) = id_from_key(&key, "view:", ":yjs:updates") {
                    ids.push(id);
                }
            }
            Ok(ids)
        })
        .await
    }
}
