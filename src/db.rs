use std::str::FromStr;

use anyhow::Context;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use thiserror::Error;
use time::OffsetDateTime;

/// Errors raised by the account store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parse database url {database_url}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await
        .context("connect to database")?;
    Ok(db)
}

pub async fn migrate(db: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;
    Ok(())
}

/// Current UTC time truncated to whole seconds, so stored TEXT timestamps
/// compare correctly as strings.
pub fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

/// True when the error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // a single connection that never recycles, or the in-memory database vanishes
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory url")
        .foreign_keys(true);
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(opts)
        .await
        .expect("in-memory pool");
    migrate(&db).await.expect("migrations");
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let db = test_pool().await;
        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&db)
        .await
        .unwrap();
        let names: Vec<String> = names.into_iter().map(|(n,)| n).collect();
        for table in ["users", "user_sessions", "analysis_history"] {
            assert!(names.iter().any(|n| n == table), "missing table {table}");
        }
    }

    #[test]
    fn now_utc_has_no_subsecond_part() {
        assert_eq!(now_utc().nanosecond(), 0);
    }
}
