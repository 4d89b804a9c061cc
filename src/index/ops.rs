//! Synchronous index operations against a rusqlite connection.
//!
//! The `records` row and its `records_fts` entry always share a rowid. Because `records_fts` is
//! an external-content table, an entry must be removed with the FTS5 `'delete'` command using the
//! exact values it was indexed with before the row changes.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{SearchFilter, SearchHit};
use crate::db::{schema, version};
use crate::error::{Result, StorageKind, StoreError};
use crate::query::CompiledQuery;
use crate::record::{Record, Reference};
use crate::resilience::CancelFlag;

/// Values a record was indexed with in `records_fts`.
struct IndexedText {
    rowid: i64,
    title: String,
    content: String,
    description: Option<String>,
    tags: String,
    record_type: String,
}

/// Insert or replace the index entry for a record.
pub fn upsert_record(conn: &mut Connection, record: &Record, path: &str) -> Result<()> {
    let tx = conn.transaction()?;

    let rowid = match indexed_text(&tx, &record.record_type, &record.id)? {
        Some(old) => {
            delete_fts(&tx, &old)?;
            update_row(&tx, old.rowid, record, path)?;
            old.rowid
        }
        None => insert_row(&tx, record, path)?,
    };
    insert_fts(&tx, rowid, record)?;

    tx.commit()?;
    Ok(())
}

/// Drop a record's index entry. Returns whether an entry existed.
pub fn remove_record(conn: &mut Connection, record_type: &str, id: &str) -> Result<bool> {
    let tx = conn.transaction()?;
    let Some(old) = indexed_text(&tx, record_type, id)? else {
        return Ok(false);
    };
    delete_fts(&tx, &old)?;
    tx.execute("DELETE FROM records WHERE rowid = ?1", params![old.rowid])?;
    tx.commit()?;
    Ok(true)
}

/// Run a compiled query with filters, best match first, then most recently updated.
pub fn execute_query(
    conn: &Connection,
    query: &CompiledQuery,
    filter: &SearchFilter,
) -> Result<Vec<SearchHit>> {
    let mut values: Vec<Value> = Vec::new();
    let mut sql = String::from(
        "SELECT r.type, r.id, r.title, r.description, r.tags, r.status, r.priority, r.path, \
         r.updated_at, ",
    );

    match &query.rank_match {
        Some(rank_match) => {
            sql.push_str(
                "COALESCE(-m.score, 0.0) FROM records r \
                 LEFT JOIN (SELECT rowid AS hit, rank AS score FROM records_fts \
                 WHERE records_fts MATCH ?) m ON m.hit = r.rowid",
            );
            values.push(Value::Text(rank_match.clone()));
        }
        None => sql.push_str("0.0 FROM records r"),
    }

    let mut clauses: Vec<String> = Vec::new();
    if let Some(predicate) = query.predicate() {
        clauses.push(format!("({predicate})"));
        values.extend(query.params().iter().cloned().map(Value::Text));
    }
    if let Some(record_type) = &filter.record_type {
        clauses.push("r.type = ?".into());
        values.push(Value::Text(record_type.clone()));
    }
    if let Some(status) = &filter.status {
        clauses.push("r.status = ?".into());
        values.push(Value::Text(status.clone()));
    }
    if let Some(priority) = &filter.priority {
        clauses.push("r.priority = ?".into());
        values.push(Value::Text(priority.clone()));
    }
    for tag in &filter.tags {
        clauses.push("instr(' ' || r.tags || ' ', ?) > 0".into());
        values.push(Value::Text(format!(" {tag} ")));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    sql.push_str(" ORDER BY ");
    if query.rank_match.is_some() {
        // bm25 rank is negative; smaller is better
        sql.push_str("m.score IS NULL, m.score, ");
    }
    sql.push_str("r.updated_at DESC, r.type, r.id LIMIT ?");
    values.push(Value::Integer(filter.limit.max(1) as i64));

    let mut stmt = conn.prepare(&sql)?;
    let hits = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            let tags: String = row.get(4)?;
            Ok(SearchHit {
                record_type: row.get(0)?,
                id: row.get(1)?,
                title: row.get(2)?,
                description: row.get(3)?,
                tags: tags.split_whitespace().map(str::to_string).collect(),
                status: row.get(5)?,
                priority: row.get(6)?,
                path: row.get(7)?,
                updated_at: row.get(8)?,
                score: row.get(9)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(hits)
}

pub fn count_records(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// Indexed records whose `related` list contains `target`.
pub fn referrers(conn: &Connection, target: &Reference) -> Result<Vec<Reference>> {
    let mut stmt = conn.prepare(
        "SELECT type, id FROM records WHERE instr(' ' || related || ' ', ?1) > 0 ORDER BY type, id",
    )?;
    let refs = stmt
        .query_map(params![format!(" {target} ")], |row| {
            Ok(Reference::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(refs)
}

/// Replace the whole index generation in one transaction and stamp `version`.
///
/// The cancel flag is checked before each insert; cancelling or any error rolls the transaction
/// back, leaving the previous generation untouched.
pub fn replace_all(
    conn: &mut Connection,
    records: &[(Record, String)],
    version: &str,
    cancel: &CancelFlag,
) -> Result<usize> {
    let tx = conn.transaction()?;
    schema::drop_record_tables(&tx)?;
    schema::init_schema(&tx)?;

    for (record, path) in records {
        cancel.check("index.rebuild")?;
        let rowid = insert_row(&tx, record, path)?;
        insert_fts(&tx, rowid, record)?;
    }

    version::set_schema_version(&tx, version)?;
    tx.commit()?;
    Ok(records.len())
}

fn indexed_text(conn: &Connection, record_type: &str, id: &str) -> Result<Option<IndexedText>> {
    let row = conn
        .query_row(
            "SELECT rowid, title, content, description, tags, type FROM records
             WHERE type = ?1 AND id = ?2",
            params![record_type, id],
            |row| {
                Ok(IndexedText {
                    rowid: row.get(0)?,
                    title: row.get(1)?,
                    content: row.get(2)?,
                    description: row.get(3)?,
                    tags: row.get(4)?,
                    record_type: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn insert_row(conn: &Connection, record: &Record, path: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO records (type, id, title, description, content, tags, related, status,
                              priority, path, created_at, updated_at, fields)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            record.record_type,
            record.id,
            record.title,
            record.description,
            record.body,
            joined_tags(record),
            record.related.join(" "),
            record.status(),
            record.priority(),
            path,
            record.created_at,
            record.updated_at,
            fields_json(record)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn update_row(conn: &Connection, rowid: i64, record: &Record, path: &str) -> Result<()> {
    conn.execute(
        "UPDATE records SET title = ?1, description = ?2, content = ?3, tags = ?4, related = ?5,
                status = ?6, priority = ?7, path = ?8, created_at = ?9, updated_at = ?10,
                fields = ?11
         WHERE rowid = ?12",
        params![
            record.title,
            record.description,
            record.body,
            joined_tags(record),
            record.related.join(" "),
            record.status(),
            record.priority(),
            path,
            record.created_at,
            record.updated_at,
            fields_json(record)?,
            rowid,
        ],
    )?;
    Ok(())
}

/// Index a record's text. Must use the rowid of its `records` row.
fn insert_fts(conn: &Connection, rowid: i64, record: &Record) -> Result<()> {
    conn.execute(
        "INSERT INTO records_fts (rowid, title, content, description, tags, type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            rowid,
            record.title,
            record.body,
            record.description,
            joined_tags(record),
            record.record_type,
        ],
    )?;
    Ok(())
}

fn delete_fts(conn: &Connection, old: &IndexedText) -> Result<()> {
    conn.execute(
        "INSERT INTO records_fts (records_fts, rowid, title, content, description, tags, type)
         VALUES ('delete', ?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            old.rowid,
            old.title,
            old.content,
            old.description,
            old.tags,
            old.record_type,
        ],
    )?;
    Ok(())
}

fn joined_tags(record: &Record) -> String {
    record.tags.iter().cloned().collect::<Vec<_>>().join(" ")
}

fn fields_json(record: &Record) -> Result<Option<String>> {
    if record.fields.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(&record.fields)
        .map(Some)
        .map_err(|e| StoreError::storage("index.write", StorageKind::Index, e.to_string()))
}
