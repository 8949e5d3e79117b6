//! Persistence Layer
//!
//! Trade store backends behind the [`TradeStore`] trait:
//! - a JSON file (`trades.json`), rewritten atomically on every mutation
//! - SQLite via sqlx (`sqlite://path/to.db`), one row per trade
//!
//! # Database Schema
//!
//! ## Trades Table
//! - id: Trade id (creation time in seconds)
//! - symbol: Trading pair (e.g., "B-BTC_USDT")
//! - side: "LONG" or "SHORT"
//! - qty, entry_price: REAL
//! - sl_order_id: Optional stop-loss order id
//! - tp_order_ids, targets: JSON arrays
//! - monitor_trigger_level: INTEGER, 0 disables the breakeven move
//! - sl_moved: BOOLEAN
//! - created_at: Timestamp

pub mod json_store;
pub mod models;
pub mod sqlite_store;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::domain::repositories::trade_store::{StoreError, TradeStore};
use json_store::JsonFileTradeStore;
use sqlite_store::SqliteTradeStore;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<DatabaseError> for StoreError {
    fn from(e: DatabaseError) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Open the trade store named by `store_url`: a `sqlite:` URL or a file path
pub async fn open_store(store_url: &str) -> Result<Arc<dyn TradeStore>, StoreError> {
    if store_url.starts_with("sqlite:") {
        let pool = init_database(store_url).await?;
        Ok(Arc::new(SqliteTradeStore::new(pool)))
    } else {
        info!("Using trade file {}", store_url);
        Ok(Arc::new(JsonFileTradeStore::new(store_url)))
    }
}

/// Initialize the database connection pool and run migrations
///
/// # Arguments
/// - `database_url`: e.g. "sqlite://data/trades.db" or "sqlite::memory:"
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);
    let in_memory = database_url.contains(":memory:");

    // Ensure data directory exists
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // Each in-memory connection is its own database, so keep exactly one alive
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };
    let pool = pool_options.connect_with(options).await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            id TEXT PRIMARY KEY,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('LONG', 'SHORT')),
            qty REAL NOT NULL,
            entry_price REAL NOT NULL,
            sl_order_id TEXT,
            tp_order_ids TEXT NOT NULL DEFAULT '[]',
            targets TEXT NOT NULL DEFAULT '[]',
            monitor_trigger_level INTEGER NOT NULL DEFAULT 0,
            sl_moved BOOLEAN NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    info!("✓ Database migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_store_picks_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.json");
        let store = open_store(path.to_str().unwrap()).await.unwrap();
        assert!(store.list().await.is_empty());

        let store = open_store("sqlite::memory:").await.unwrap();
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("data").join("trades.db");
        let url = format!("sqlite://{}", db.display());
        init_database(&url).await.unwrap();
        assert!(db.exists());
    }
}
