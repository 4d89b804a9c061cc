//! Derived full-text index over the canonical store.
//!
//! [`SearchIndex`] owns the SQLite connection and runs every operation on the blocking pool.
//! The index is never authoritative: anything in it can be regenerated from the record files
//! with [`SearchIndex::rebuild`].

pub mod ops;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Serialize;

use crate::db::version;
use crate::error::{Result, StorageKind, StoreError};
use crate::query::CompiledQuery;
use crate::record::{Record, Reference};
use crate::resilience::CancelFlag;

/// Default number of hits returned by a search.
pub const DEFAULT_LIMIT: usize = 20;

/// Constraints applied on top of the query. Every set filter must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub record_type: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub tags: Vec<String>,
    pub limit: usize,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            record_type: None,
            status: None,
            priority: None,
            tags: Vec::new(),
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SearchFilter {
    pub fn of_type(record_type: impl Into<String>) -> Self {
        Self {
            record_type: Some(record_type.into()),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(rename = "type")]
    pub record_type: String,
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    pub path: String,
    pub updated_at: String,
    /// Relevance, higher is better. Zero for pure listings.
    pub score: f64,
}

impl SearchHit {
    pub fn reference(&self) -> Reference {
        Reference::new(&self.record_type, &self.id)
    }
}

/// Handle to the index database, cheap to clone.
#[derive(Clone)]
pub struct SearchIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SearchIndex {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// In-memory index with the current schema version, for tests.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(crate::db::open_memory_index()?))
    }

    pub async fn upsert(&self, record: &Record, path: &Path) -> Result<()> {
        let record = record.clone();
        let path = path.display().to_string();
        self.run("index.upsert", move |conn| ops::upsert_record(conn, &record, &path))
            .await
    }

    pub async fn remove(&self, record_type: &str, id: &str) -> Result<bool> {
        let (record_type, id) = (record_type.to_string(), id.to_string());
        self.run("index.remove", move |conn| {
            ops::remove_record(conn, &record_type, &id)
        })
        .await
    }

    pub async fn execute(&self, query: &CompiledQuery, filter: &SearchFilter) -> Result<Vec<SearchHit>> {
        let (query, filter) = (query.clone(), filter.clone());
        self.run("index.search", move |conn| {
            ops::execute_query(conn, &query, &filter)
        })
        .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.run("index.count", |conn| ops::count_records(conn)).await
    }

    pub async fn referrers(&self, target: &Reference) -> Result<Vec<Reference>> {
        let target = target.clone();
        self.run("index.referrers", move |conn| ops::referrers(conn, &target))
            .await
    }

    /// Stored schema version, `None` when never stamped.
    pub async fn stored_version(&self) -> Result<Option<String>> {
        self.run("index.version", |conn| Ok(version::get_schema_version(conn)?))
            .await
    }

    /// Swap in a new generation built from `records` (each paired with its file path).
    pub async fn rebuild(
        &self,
        records: Vec<(Record, String)>,
        schema_version: &str,
        cancel: &CancelFlag,
    ) -> Result<usize> {
        let schema_version = schema_version.to_string();
        let cancel = cancel.clone();
        self.run("index.rebuild", move |conn| {
            ops::replace_all(conn, &records, &schema_version, &cancel)
        })
        .await
    }

    /// Run `f` with exclusive access to the connection on the blocking pool.
    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().map_err(|e| {
                StoreError::storage(operation, StorageKind::Index, format!("db lock poisoned: {e}"))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::storage(operation, StorageKind::Index, format!("db task failed: {e}"))
        })?
    }
}
