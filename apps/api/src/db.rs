use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

/// File name of the embedded index inside the vector store directory.
pub const INDEX_FILE: &str = "index.sqlite3";

/// Creates and returns a SQLite connection pool, creating the file if missing.
pub async fn create_pool(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    info!("Opening SQLite index at {}", path.display());

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    info!("SQLite connection pool established");
    Ok(pool)
}
