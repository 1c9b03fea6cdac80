pub mod migrations;
pub mod models;
pub mod store;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

const DB_FILE: &str = "chathub.db";

/// The single SQLite handle. Callers hop onto the blocking pool to use it.
pub type DbPool = Arc<Mutex<Connection>>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to create data directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] rusqlite_migration::Error),
}

/// Open `<data_dir>/chathub.db` and bring its schema up to date.
pub fn init_db(data_dir: &str) -> Result<DbPool, DbError> {
    std::fs::create_dir_all(data_dir)?;
    let path = Path::new(data_dir).join(DB_FILE);

    let mut conn = Connection::open(&path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrations::migrations().to_latest(&mut conn)?;

    tracing::info!(path = %path.display(), "Database ready");
    Ok(Arc::new(Mutex::new(conn)))
}
