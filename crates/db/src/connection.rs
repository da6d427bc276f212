use std::time::Duration;

use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions};

use tollgate_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    // The busy_timeout tracks the acquire timeout so a write-lock wait
    // never outlives the caller's own patience.
    let busy_timeout_ms = timeout_secs.max(1).saturating_mul(1000);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(move |conn, _meta| Box::pin(configure_sqlite(conn, busy_timeout_ms)))
        .connect(database_url)
        .await
}

/// Per-connection pragmas: enforced foreign keys for the tenant cascades,
/// WAL so cross-tenant reads do not block on the authorize write lock.
async fn configure_sqlite(
    conn: &mut SqliteConnection,
    busy_timeout_ms: u64,
) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
    sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
        .execute(&mut *conn)
        .await?;
    Ok(())
}
