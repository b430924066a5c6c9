//! Database module: pool setup, row models and the queue repository.
//!
//! - `model`: rows as decoded from SQLite, converted into domain entries.
//! - `queue`: SQL-only functions backing the print queue.
//!
//! Callers import from `factory_queue::db`; the queue API is re-exported here.

pub mod model;
pub mod queue;

pub use queue::*;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub type Pool = SqlitePool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid JSON in column `{column}`: {source}")]
    Json {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown marketplace '{0}' stored in row")]
    UnknownMarketplace(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Expand a leading `~/` in a file-backed SQLite URL and make sure the parent
/// directory exists. In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{path}?{q}"),
        None => format!("sqlite://{path}"),
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> Pool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_and_foreign_urls_pass_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://localhost/db"),
            "postgres://localhost/db"
        );
    }

    #[test]
    fn file_url_is_normalized_and_parent_created() {
        let td = tempfile::tempdir().unwrap();
        let db_path = td.path().join("nested").join("queue.db");
        let url = format!("sqlite:{}?mode=rwc", db_path.display());
        let normalized = prepare_sqlite_url(&url);
        assert_eq!(normalized, format!("sqlite://{}?mode=rwc", db_path.display()));
        assert!(td.path().join("nested").exists());
    }

    #[tokio::test]
    async fn init_pool_creates_database_file() {
        let td = tempfile::tempdir().unwrap();
        let db_path = td.path().join("queue.db");
        let pool = init_pool(&format!("sqlite://{}", db_path.display()))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        assert!(db_path.exists());
    }
}
