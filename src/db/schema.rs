//! SQL DDL for the search index.
//!
//! Defines the `records` projection, the `records_fts` (FTS5) external-content index over it,
//! and `schema_meta`. Record tables are dropped and recreated by a rebuild; `schema_meta` is
//! only ever created, never dropped.

use rusqlite::Connection;

/// Record projection and its full-text index.
const RECORDS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    type TEXT NOT NULL,
    id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '',
    related TEXT NOT NULL DEFAULT '',
    status TEXT,
    priority TEXT,
    path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    fields TEXT,
    UNIQUE(type, id)
);

CREATE INDEX IF NOT EXISTS idx_records_type ON records(type);
CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);
CREATE INDEX IF NOT EXISTS idx_records_updated ON records(updated_at);

CREATE VIRTUAL TABLE IF NOT EXISTS records_fts USING fts5(
    title,
    content,
    description,
    tags,
    type,
    content='records',
    content_rowid='rowid'
);
"#;

const META_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Create every index table. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(RECORDS_SQL)?;
    conn.execute_batch(META_SQL)?;
    Ok(())
}

/// Drop the record tables so a rebuild can recreate them from scratch.
pub fn drop_record_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS records_fts;
         DROP TABLE IF EXISTS records;",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables = table_names(&conn);
        assert!(tables.contains(&"records".to_string()));
        assert!(tables.contains(&"records_fts".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn drop_keeps_schema_meta() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        drop_record_tables(&conn).unwrap();

        let tables = table_names(&conn);
        assert!(!tables.contains(&"records".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
    }
}
