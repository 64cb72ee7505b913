// Database layer — SQLite storage for runs, trend tables and the enrichment cache.
//
// We use rusqlite with the "bundled" feature so there's no system SQLite
// dependency. The database file lives wherever TOPICSCOUT_DB_PATH points
// (defaults to ./topicscout.db).

pub mod models;
pub mod queries;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteDatabase;
pub use traits::Database;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

/// Open (or create) the database and run migrations.
///
/// Called by `topicscout init` and by `run`, which creates the file on
/// first use.
pub fn initialize(db_path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path).with_context(|| format!("Failed to open database at {}", db_path))?;

    // WAL lets report/status read while a run is writing
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Open an existing database (fails if it doesn't exist yet).
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        anyhow::bail!("Database not found at {}. Run `topicscout init` first.", db_path);
    }

    let conn = Connection::open(db_path).with_context(|| format!("Failed to open database at {}", db_path))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Wrap a connection as a shareable `Database`.
pub fn shared(conn: Connection) -> Arc<dyn Database> {
    Arc::new(SqliteDatabase::new(conn))
}

/// In-memory database with the schema applied. Used by tests and dry runs.
pub fn in_memory() -> Result<Arc<dyn Database>> {
    let conn = Connection::open_in_memory()?;
    schema::create_tables(&conn)?;
    Ok(shared(conn))
}
