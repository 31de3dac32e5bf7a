use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

pub type PgPool = Pool<Postgres>;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects the durable-store pool. `max_open` comes from configuration so
/// the web process and a standalone persister worker can size themselves
/// differently against the same database.
pub async fn connect_pool(dsn: &str, max_open: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_open)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(dsn)
        .await
        .context("connect to durable store")?;
    Ok(pool)
}

/// Migrations are embedded at compile time from ./migrations; running them
/// is idempotent.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("apply embedded migrations")?;
    Ok(())
}

pub mod repositories;
