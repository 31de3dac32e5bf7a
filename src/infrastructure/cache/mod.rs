use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;

mod note_cache_redis;
mod spreadsheet_cache_redis;
mod view_cache_redis;
mod whiteboard_cache_redis;

pub use note_cache_redis::*;
pub use spreadsheet_cache_redis::*;
pub use view_cache_redis::*;
pub use whiteboard_cache_redis::*;

/// Every document key carries this TTL; any write or activity renews it.
pub const CACHE_TTL_SECS: i64 = 24 * 60 * 60;

/// The rooms call the cache inline, so individual calls must stay bounded.
pub(crate) const CACHE_OP_TIMEOUT: Duration = Duration::from_secs(2);

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Shared handle to the KV store. `ConnectionManager` reconnects on its own,
/// so clones are cheap and long-lived.
#[derive(Clone)]
pub struct CacheClient {
    manager: ConnectionManager,
}

impl CacheClient {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }

    pub(crate) fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

pub(crate) async fn with_timeout<T>(
    fut: impl Future<Output = redis::RedisResult<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(CACHE_OP_TIMEOUT, fut).await {
        Ok(res) => res.map_err(Into::into),
        Err(_) => Err(anyhow::anyhow!("cache call exceeded {CACHE_OP_TIMEOUT:?}")),
    }
}

/// `SET key owner NX EX ttl`; the stored owner token gates the unlock.
pub(crate) async fn acquire_lock(
    mut conn: ConnectionManager,
    key: &str,
    owner: &str,
    ttl_secs: i64,
) -> anyhow::Result<bool> {
    let reply = with_timeout(async {
        redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<Option<String>>(&mut conn)
            .await
    })
    .await?;
    Ok(reply.is_some())
}

/// Scripted compare-and-delete: only the owner's token releases the lock, so
/// a stale owner can never unlock a later acquirer.
pub(crate) async fn release_lock(
    mut conn: ConnectionManager,
    key: &str,
    owner: &str,
) -> anyhow::Result<()> {
    with_timeout(async {
        redis::cmd("EVAL")
            .arg(RELEASE_LOCK_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(owner)
            .query_async::<i64>(&mut conn)
            .await
    })
    .await?;
    Ok(())
}

/// Extract the document ID out of a scanned key, e.g.
/// `spreadsheet:{id}:sheets` -> `{id}`.
pub(crate) fn id_from_key(key: &str, prefix: &str, suffix: &str) -> Option<String> {
    let id = key.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if id.is_empty() { None } else { Some(id.to_string()) }
}
