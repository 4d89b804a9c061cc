//! Keeps the search index in step with the canonical store.
//!
//! At startup the index's stored schema version must equal the running binary's version; there
//! is no in-place upgrade. A mismatch is fatal until the operator runs `dossier rebuild`, which
//! regenerates the whole index from the record files.

use std::time::{Duration, Instant};

use rusqlite::Connection;
use serde::Serialize;

use crate::db::version;
use crate::error::{Result, StoreError};
use crate::index::SearchIndex;
use crate::resilience::CancelFlag;
use crate::store::CanonicalStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildReport {
    /// Records indexed in the new generation.
    pub records: usize,
    pub schema_version: String,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Compare the index's stored schema version with `expected`.
pub fn verify(conn: &Connection, expected: &str) -> Result<()> {
    let found = version::get_schema_version(conn)?;
    check_version(found, expected)
}

/// [`verify`] through an open [`SearchIndex`] handle.
pub async fn verify_index(index: &SearchIndex, expected: &str) -> Result<()> {
    check_version(index.stored_version().await?, expected)
}

fn check_version(found: Option<String>, expected: &str) -> Result<()> {
    match found {
        Some(found) if found == expected => Ok(()),
        found => {
            tracing::error!(
                expected,
                found = found.as_deref().unwrap_or("<none>"),
                "index schema version mismatch"
            );
            Err(StoreError::VersionMismatch {
                expected: expected.to_string(),
                found,
            })
        }
    }
}

/// Regenerate the index from every canonical record.
///
/// `progress` is called with the number of records read so far. The cancel flag is checked
/// between records while scanning and again between inserts.
pub async fn rebuild<P>(
    store: &CanonicalStore,
    index: &SearchIndex,
    cancel: &CancelFlag,
    mut progress: P,
) -> Result<RebuildReport>
where
    P: FnMut(usize),
{
    let started = Instant::now();
    let mut scan = store.scan_all().await?;
    tracing::info!(listed = scan.len(), "rebuilding index");

    let mut records = Vec::with_capacity(scan.len());
    while let Some(record) = scan.next().await {
        cancel.check("rebuild")?;
        let record = record?;
        let path = store
            .path_for(&record.record_type, &record.id)
            .display()
            .to_string();
        records.push((record, path));
        progress(records.len());
    }

    let schema_version = version::running_version().to_string();
    let count = index.rebuild(records, &schema_version, cancel).await?;

    let report = RebuildReport {
        records: count,
        schema_version,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        records = report.records,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "index rebuilt"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    #[test]
    fn missing_table_is_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        match verify(&conn, "1.0.0") {
            Err(StoreError::VersionMismatch { expected, found }) => {
                assert_eq!(expected, "1.0.0");
                assert_eq!(found, None);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_row_is_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        let err = verify(&conn, "1.0.0").unwrap_err();
        assert!(err.to_string().contains("older release"));
    }

    #[test]
    fn different_version_names_both() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        version::set_schema_version(&conn, "0.9.0").unwrap();

        let err = verify(&conn, "1.0.0").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("0.9.0") && message.contains("1.0.0"), "{message}");
        assert!(message.contains("dossier rebuild"));
    }

    #[test]
    fn equal_version_passes() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        version::set_schema_version(&conn, "1.0.0").unwrap();
        verify(&conn, "1.0.0").unwrap();
    }

    #[tokio::test]
    async fn cancelled_scan_stops_rebuild() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = CanonicalStore::new(tmp.path());
        let dir = tmp.path().join("knowledge");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("knowledge-1.md"), "---\ntitle: One\n---\nbody")
            .await
            .unwrap();

        let index = SearchIndex::open_in_memory().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = rebuild(&store, &index, &cancel, |_| {}).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled { .. }));
    }
}
