//! Schema version bookkeeping in `schema_meta`.
//!
//! The stored `schema_version` is the version of the binary that last rebuilt the index. It is
//! compared at startup against [`running_version`]; see [`crate::consistency`].

use rusqlite::{Connection, OptionalExtension};

/// Version string of the running binary.
pub fn running_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Read the stored schema version. `None` when the `schema_meta` table or the row is missing.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<Option<String>> {
    let has_table: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_meta'",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(None);
    }
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, String>(0),
    )
    .optional()
}

/// Record `version` as the index's schema version.
pub fn set_schema_version(conn: &Connection, version: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [version],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_table_reads_as_none() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), None);
    }

    #[test]
    fn missing_row_reads_as_none() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), None);
    }

    #[test]
    fn set_and_get_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();

        set_schema_version(&conn, "0.1.0").unwrap();
        set_schema_version(&conn, running_version()).unwrap();
        assert_eq!(
            get_schema_version(&conn).unwrap().as_deref(),
            Some(running_version())
        );
    }
}
