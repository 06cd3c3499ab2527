//! Session memory persistence in `SQLite`

mod schema;
pub mod session;

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::{Error, Result};

pub use schema::SCHEMA_VERSION;
pub use session::{MemorySessionStore, SessionRepo, SessionStore, ThreadSummary};

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Open (or create) the session database at `path`
///
/// The parent directory is created on first use.
///
/// # Errors
///
/// Returns error if database cannot be opened or migrated
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let pool = open_pool(SqliteConnectionManager::file(path), 4)?;
    tracing::info!(version = SCHEMA_VERSION, path = %path.display(), "session database ready");
    Ok(pool)
}

/// Single-connection in-memory database
///
/// # Errors
///
/// Returns error if database cannot be initialized
pub fn init_memory() -> Result<DbPool> {
    open_pool(SqliteConnectionManager::memory(), 1)
}

fn open_pool(manager: SqliteConnectionManager, size: u32) -> Result<DbPool> {
    // Every pooled connection enforces the thread reference
    let manager = manager.with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));

    let pool = Pool::builder()
        .max_size(size)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    schema::init(&conn)?;

    Ok(pool)
}
