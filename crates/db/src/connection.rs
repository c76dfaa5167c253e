use std::str::FromStr;
use std::time::Duration;

use leadgate_core::config::LeadLogConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 2, 5).await
}

/// Opens the lead log pool, creating the database file on first use.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(normalize_url(database_url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

/// `Ok(None)` when the lead log is not configured.
pub async fn connect_lead_log(config: &LeadLogConfig) -> Result<Option<DbPool>, sqlx::Error> {
    match config.url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => {
            connect_with_settings(url, config.max_connections, config.timeout_secs).await.map(Some)
        }
        None => Ok(None),
    }
}

fn normalize_url(database_url: &str) -> &str {
    match database_url.trim() {
        ":memory:" => "sqlite::memory:",
        other => other,
    }
}
