use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use redis::AsyncCommands;

use crate::application::ports::note_cache::NoteCache;
use crate::domain::documents::NoteData;

use super::{CACHE_TTL_SECS, CacheClient, acquire_lock, id_from_key, release_lock, with_timeout};

const SNAPSHOT_LOCK_TTL_SECS: i64 = 30;

fn data_key(note_id: &str) -> String {
    format!("note:{note_id}:data")
}

fn snapshot_key(note_id: &str) -> String {
    format!("note:{note_id}:yjs:snapshot")
}

fn updates_key(note_id: &str) -> String {
    format!("note:{note_id}:yjs:updates")
}

fn lock_key(note_id: &str) -> String {
    format!("note:{note_id}:yjs:lock")
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub struct RedisNoteCache {
    client: CacheClient,
}

impl RedisNoteCache {
    pub fn new(client: CacheClient) -> Self {
        Self { client }
    }

    async fn update_fields(&self, note_id: &str, fields: &[(&str, &str)]) -> anyhow::Result<()> {
        let key = data_key(note_id);
        let mut conn = self.client.conn();
        with_timeout(async {
            redis::pipe()
                .hset_multiple(&key, fields)
                .ignore()
                .expire(&key, CACHE_TTL_SECS)
                .ignore()
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }
}

#[async_trait]
impl NoteCache for RedisNoteCache {
    async fn note_data(&self, note_id: &str) -> anyhow::Result<Option<NoteData>> {
        let key = data_key(note_id);
        let mut conn = self.client.conn();
        let mut raw: HashMap<String, String> = with_timeout(conn.hgetall(&key)).await?;
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(NoteData {
            title: raw.remove("title").unwrap_or_default(),
            content: raw.remove("content").unwrap_or_default(),
            updated_at: raw.remove("updated_at").unwrap_or_default(),
            updated_by: raw.remove("updated_by").unwrap_or_default(),
        }))
    }

    async fn set_note_data(&self, note_id: &str, data: &NoteData) -> anyhow::Result<()> {
        self.update_fields(
            note_id,
            &[
                ("title", data.title.as_str()),
                ("content", data.content.as_str()),
                ("updated_at", data.updated_at.as_str()),
                ("updated_by", data.updated_by.as_str()),
            ],
        )
        .await
    }

    async fn update_title(
        &self,
        note_id: &str,
        title: &str,
        updated_by: &str,
    ) -> anyhow::Result<()> {
        let updated_at = now_rfc3339();
        self.update_fields(
            note_id,
            &[
                ("title", title),
                ("updated_at", updated_at.as_str()),
                ("updated_by", updated_by),
            ],
        )
        .await
    }

    async fn update_content(
        &self,
        note_id: &str,
        content: &str,
        updated_by: &str,
    ) -> anyhow::Result<()> {
        let updated_at = now_rfc3339();
        self.update_fields(
            note_id,
            &[
                ("content", content),
                ("updated_at", updated_at.as_str()),
                ("updated_by", updated_by),
            ],
        )
        .await
    }

    async fn yjs_snapshot(&self, note_id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let key = snapshot_key(note_id);
        let mut conn = self.client.conn();
        with_timeout(conn.get(&key)).await
    }

    async fn set_yjs_snapshot(&self, note_id: &str, snapshot: &[u8]) -> anyhow::Result<()> {
        let key = snapshot_key(note_id);
        let mut conn = self.client.conn();
        with_timeout(conn.set_ex(&key, snapshot, CACHE_TTL_SECS as u64)).await
    }

    async fn has_yjs_snapshot(&self, note_id: &str) -> anyhow::Result<bool> {
        let key = snapshot_key(note_id);
        let mut conn = self.client.conn();
        with_timeout(conn.exists(&key)).await
    }

    async fn yjs_updates(&self, note_id: &str) -> anyhow::Result<Vec<Vec<u8>>> {
        let key = updates_key(note_id);
        let mut conn = self.client.conn();
        with_timeout(conn.lrange(&key, 0, -1)).await
    }

    async fn append_yjs_update(&self, note_id: &str, update: &[u8]) -> anyhow::Result<()> {
        let key = updates_key(note_id);
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

    async fn clear_yjs_updates(&self, note_id: &str) -> anyhow::Result<()> {
        let key = updates_key(note_id);
        let mut conn = self.client.conn();
        with_timeout(conn.del(&key)).await
    }

    async fn acquire_snapshot_lock(&self, note_id: &str, owner: &str) -> anyhow::Result<bool> {
        acquire_lock(self.client.conn(), &lock_key(note_id), owner, SNAPSHOT_LOCK_TTL_SECS).await
    }

    async fn release_snapshot_lock(&self, note_id: &str, owner: &str) -> anyhow::Result<()> {
        release_lock(self.client.conn(), &lock_key(note_id), owner).await
    }

    async fn refresh_ttl(&self, note_id: &str) -> anyhow::Result<()> {
        let data = data_key(note_id);
        let snapshot = snapshot_key(note_id);
        let updates = updates_key(note_id);
        let mut conn = self.client.conn();
        with_timeout(async {
            redis::pipe()
                .expire(&data, CACHE_TTL_SECS)
                .ignore()
                .expire(&snapshot, CACHE_TTL_SECS)
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
            let mut iter = conn.scan_match::<_, String>("note:*:data").await?;
            while let Some(key) = iter.next_item().await {
                if let Some(id) = id_from_key(&key, "note:", ":data") {
                    ids.push(id);
                }
            }
            Ok(ids)
        })
        .await
    }
}
