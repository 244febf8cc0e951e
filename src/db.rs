use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use recipehub_core::{CoreError, CoreResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(config.store.timeout_ms))
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_millis(config.store.timeout_ms))
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(pool)
}

/// Maps a sqlx failure into the core taxonomy.
///
/// Constraint violations become `Conflict`; everything else (pool timeout,
/// I/O, closed pool, decode failures) is reported as the store being
/// unavailable.
pub fn store_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Database(db)
            if db.is_unique_violation() || db.is_foreign_key_violation() =>
        {
            CoreError::Conflict(db.message().to_string())
        }
        _ => CoreError::TransportUnavailable(format!("sqlite: {}", err)),
    }
}

/// Current time at the millisecond precision the schema stores.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn from_millis(ms: i64) -> CoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CoreError::MalformedPayload(format!("timestamp out of range: {}", ms)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_creates_parent_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("nested/dir/test.sqlite");
        let pool = connect(&config).await.unwrap();
        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 1);
        pool.close().await;
        assert!(config.db.path.exists());
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("test.sqlite");
        let pool = connect(&config).await.unwrap();
        pool.close().await;
        let err = sqlx::query("SELECT 1").execute(&pool).await.unwrap_err();
        assert!(store_error(err).is_transient());
    }

    #[test]
    fn test_from_millis_round_trips() {
        let now = Utc::now();
        let back = from_millis(now.timestamp_millis()).unwrap();
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }
}
