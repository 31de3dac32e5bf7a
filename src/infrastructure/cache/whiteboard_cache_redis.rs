use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::application::ports::whiteboard_cache::WhiteboardCache;
use crate::domain::documents::{CanvasObject, ViewObject};

use super::{CACHE_TTL_SECS, CacheClient, acquire_lock, id_from_key, release_lock, with_timeout};

const INIT_LOCK_TTL_SECS: i64 = 10;

/// Marker field seeded by `mark_initialized`; never surfaced as an object.
const INITIALIZED_FIELD: &str = "_initialized";

fn canvas_key(view_id: &str) -> String {
    format!("whiteboard:{view_id}:canvas")
}

fn view_objects_key(view_id: &str) -> String {
    format!("whiteboard:{view_id}:viewobjects")
}

fn yjs_state_key(view_id: &str) -> String {
    format!("whiteboard:{view_id}:yjsstate")
}

fn lock_key(view_id: &str) -> String {
    format!("whiteboard:{view_id}:init:lock")
}

pub struct RedisWhiteboardCache {
    client: CacheClient,
}

impl RedisWhiteboardCache {
    pub fn new(client: CacheClient) -> Self {
        Self { client }
    }

    async fn object_map<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> anyhow::Result<HashMap<String, T>> {
        let mut conn = self.client.conn();
        let raw: HashMap<String, String> = with_timeout(conn.hgetall(key)).await?;
        let mut objects = HashMap::with_capacity(raw.len());
        for (id, data) in raw {
            if id == INITIALIZED_FIELD {
                continue;
            }
            // Entries that fail to parse are skipped rather than failing the
            // whole read.
            match serde_json::from_str(&data) {
                Ok(obj) => {
                    objects.insert(id, obj);
                }
                Err(e) => {
                    tracing::warn!(key, field = %id, error = %e, "dropping_unparsable_cache_object");
                }
            }
        }
        Ok(objects)
    }

    async fn set_object<T: Serialize>(
        &self,
        key: &str,
        object_id: &str,
        object: &T,
    ) -> anyhow::Result<()> {
        let data = serde_json::to_string(object)?;
        let mut conn = self.client.conn();
        with_timeout(async {
            redis::pipe()
                .hset(key, object_id, data)
                .ignore()
                .expire(key, CACHE_TTL_SECS)
                .ignore()
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }
}

#[async_trait]
impl WhiteboardCache for RedisWhiteboardCache {
    async fn canvas_objects(
        &self,
        view_id: &str,
    ) -> anyhow::Result<HashMap<String, CanvasObject>> {
        self.object_map(&canvas_key(view_id)).await
    }

    async fn set_canvas_object(
        &self,
        view_id: &str,
        object: &CanvasObject,
    ) -> anyhow::Result<()> {
        self.set_object(&canvas_key(view_id), &object.id, object).await
    }

    async fn delete_canvas_object(&self, view_id: &str, object_id: &str) -> anyhow::Result<()> {
        let key = canvas_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.hdel(&key, object_id)).await
    }

    async fn clear_canvas_objects(&self, view_id: &str) -> anyhow::Result<()> {
        let key = canvas_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.del(&key)).await
    }

    async fn view_objects(&self, view_id: &str) -> anyhow::Result<HashMap<String, ViewObject>> {
        self.object_map(&view_objects_key(view_id)).await
    }

    async fn set_view_object(&self, view_id: &str, object: &ViewObject) -> anyhow::Result<()> {
        self.set_object(&view_objects_key(view_id), &object.id, object).await
    }

    async fn delete_view_object(&self, view_id: &str, object_id: &str) -> anyhow::Result<()> {
        let key = view_objects_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.hdel(&key, object_id)).await
    }

    async fn clear_view_objects(&self, view_id: &str) -> anyhow::Result<()> {
        let key = view_objects_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.del(&key)).await
    }

    async fn yjs_state(&self, view_id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let key = yjs_state_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.get(&key)).await
    }

    async fn set_yjs_state(&self, view_id: &str, state: &[u8]) -> anyhow::Result<()> {
        let key = yjs_state_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(conn.set_ex(&key, state, CACHE_TTL_SECS as u64)).await
    }

    async fn is_initialized(&self, view_id: &str) -> anyhow::Result<bool> {
        let canvas = canvas_key(view_id);
        let objects = view_objects_key(view_id);
        let mut conn = self.client.conn();
        let (canvas_exists, objects_exist): (bool, bool) = with_timeout(async {
            redis::pipe()
                .exists(&canvas)
                .exists(&objects)
                .query_async(&mut conn)
                .await
        })
        .await?;
        Ok(canvas_exists || objects_exist)
    }

    async fn mark_initialized(&self, view_id: &str) -> anyhow::Result<()> {
        let canvas = canvas_key(view_id);
        let objects = view_objects_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(async {
            redis::pipe()
                .hset_nx(&canvas, INITIALIZED_FIELD, "1")
                .ignore()
                .expire(&canvas, CACHE_TTL_SECS)
                .ignore()
                .hset_nx(&objects, INITIALIZED_FIELD, "1")
                .ignore()
                .expire(&objects, CACHE_TTL_SECS)
                .ignore()
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn acquire_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<bool> {
        acquire_lock(self.client.conn(), &lock_key(view_id), owner, INIT_LOCK_TTL_SECS).await
    }

    async fn release_init_lock(&self, view_id: &str, owner: &str) -> anyhow::Result<()> {
        release_lock(self.client.conn(), &lock_key(view_id), owner).await
    }

    async fn refresh_ttl(&self, view_id: &str) -> anyhow::Result<()> {
        let canvas = canvas_key(view_id);
        let objects = view_objects_key(view_id);
        let yjs_state = yjs_state_key(view_id);
        let mut conn = self.client.conn();
        with_timeout(async {
            redis::pipe()
                .expire(&canvas, CACHE_TTL_SECS)
                .ignore()
                .expire(&objects, CACHE_TTL_SECS)
                .ignore()
                .expire(&yjs_state, CACHE_TTL_SECS)
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
            let mut iter = conn.scan_match::<_, String>("whiteboard:*:canvas").await?;
            while let Some(key) = iter.next_item().await {
                if let Some(id) = id_from_key(&key, "whiteboard:", ":canvas") {
                    ids.push(id);
                }
            }
            Ok(ids)
        })
        .await
    }
}
