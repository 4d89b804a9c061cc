pub mod schema;
pub mod version;

use std::path::Path;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Milliseconds SQLite waits on a locked database before reporting `SQLITE_BUSY`.
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// An opened index database.
pub struct OpenedIndex {
    pub conn: Connection,
    /// `true` when the file did not exist before this open.
    pub created: bool,
}

/// Open (or create) the index database at the given path.
///
/// A new file gets the full schema but no schema version; the caller populates it with a
/// rebuild. An existing file is left untouched so the version gate sees it as it is.
pub fn open_index(path: impl AsRef<Path>) -> Result<OpenedIndex> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::from_io("index.open", e))?;
    }

    let created = !path.exists();
    let conn = Connection::open(path).map_err(|e| StoreError::from_sqlite("index.open", e))?;
    configure(&conn)?;

    if created {
        schema::init_schema(&conn).map_err(|e| StoreError::from_sqlite("index.open", e))?;
    }

    tracing::info!(path = %path.display(), created, "index database opened");
    Ok(OpenedIndex { conn, created })
}

/// Open an in-memory index with the schema created and the running version stamped.
pub fn open_memory_index() -> Result<Connection> {
    let conn =
        Connection::open_in_memory().map_err(|e| StoreError::from_sqlite("index.open", e))?;
    schema::init_schema(&conn).map_err(|e| StoreError::from_sqlite("index.open", e))?;
    version::set_schema_version(&conn, version::running_version())
        .map_err(|e| StoreError::from_sqlite("index.open", e))?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    // WAL lets readers proceed while a rebuild transaction is open
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| StoreError::from_sqlite("index.open", e))?;
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))
        .map_err(|e| StoreError::from_sqlite("index.open", e))?;
    Ok(())
}
