//! Canonical record files: the source of truth.
//!
//! One file per record at `<root>/<type>/<type>-<id>.md`, encoded with
//! [`crate::record::codec`]. Writes go to a temp file in the same directory and are renamed
//! into place, so a crash never leaves a half-written record.

use std::path::{Path, PathBuf};

use crate::error::{ResourceKind, Result, StoreError};
use crate::record::{codec, Record, Reference};
use crate::registry::validate_type_name;

/// Extension of record files.
pub const RECORD_EXTENSION: &str = "md";

#[derive(Debug, Clone)]
pub struct CanonicalStore {
    root: PathBuf,
}

impl CanonicalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn type_dir(&self, record_type: &str) -> PathBuf {
        self.root.join(record_type)
    }

    /// Deterministic location of a record file.
    pub fn path_for(&self, record_type: &str, id: &str) -> PathBuf {
        self.type_dir(record_type)
            .join(format!("{record_type}-{id}.{RECORD_EXTENSION}"))
    }

    /// Encode and persist a record, creating the type directory if needed.
    pub async fn write(&self, record: &Record) -> Result<PathBuf> {
        let dir = self.type_dir(&record.record_type);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::from_io("store.write", e))?;

        let path = self.path_for(&record.record_type, &record.id);
        let contents = codec::encode(&record.to_metadata(), &record.body);
        let tmp = dir.join(format!(
            ".{}-{}.{}.tmp",
            record.record_type,
            record.id,
            uuid::Uuid::now_v7()
        ));

        if let Err(e) = tokio::fs::write(&tmp, contents.as_bytes()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::from_io("store.write", e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::from_io("store.write", e));
        }

        tracing::debug!(record_type = %record.record_type, id = %record.id, path = %path.display(), "record written");
        Ok(path)
    }

    pub async fn read(&self, record_type: &str, id: &str) -> Result<Record> {
        let path = self.path_for(record_type, id);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let (meta, body) = codec::decode(&text);
                Ok(Record::from_metadata(record_type, id, &meta, body))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::not_found(
                ResourceKind::Record,
                Reference::new(record_type, id).to_string(),
            )),
            Err(e) => Err(StoreError::from_io("store.read", e)),
        }
    }

    pub async fn exists(&self, record_type: &str, id: &str) -> Result<bool> {
        tokio::fs::try_exists(self.path_for(record_type, id))
            .await
            .map_err(|e| StoreError::from_io("store.exists", e))
    }

    /// Remove a record file. Deleting a missing record is not an error; returns whether a file
    /// was actually removed.
    pub async fn delete(&self, record_type: &str, id: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(record_type, id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::from_io("store.delete", e)),
        }
    }

    /// Ids of every record file of one type, sorted numerically where possible.
    pub async fn list_ids(&self, record_type: &str) -> Result<Vec<String>> {
        let dir = self.type_dir(record_type);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::from_io("store.list", e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::from_io("store.list", e))?
        {
            let name = entry.file_name();
            if let Some(id) = id_from_file_name(record_type, &name.to_string_lossy()) {
                ids.push(id);
            }
        }
        ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        });
        Ok(ids)
    }

    pub async fn count(&self, record_type: &str) -> Result<usize> {
        Ok(self.list_ids(record_type).await?.len())
    }

    /// Next numeric id for a type: one past the largest numeric id on disk, starting at 1.
    pub async fn next_id(&self, record_type: &str) -> Result<u64> {
        let max = self
            .list_ids(record_type)
            .await?
            .iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    /// Type directories present on disk (names that pass type-name validation).
    pub async fn types_on_disk(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::from_io("store.scan", e)),
        };
        let mut types = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::from_io("store.scan", e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_dir && validate_type_name(&name).is_ok() {
                types.push(name);
            }
        }
        types.sort();
        Ok(types)
    }

    /// Enumerate every stored record. File contents are read one at a time as the scan advances.
    pub async fn scan_all(&self) -> Result<RecordScan> {
        let mut entries = Vec::new();
        for record_type in self.types_on_disk().await? {
            for id in self.list_ids(&record_type).await? {
                entries.push(Reference::new(record_type.clone(), id));
            }
        }
        Ok(RecordScan {
            store: self.clone(),
            entries,
            pos: 0,
        })
    }
}

/// `issues-42.md` in `issues/` → `42`.
fn id_from_file_name(record_type: &str, file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(&format!(".{RECORD_EXTENSION}"))?;
    let id = stem.strip_prefix(record_type)?.strip_prefix('-')?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(id.to_string())
    } else {
        None
    }
}

/// Finite, restartable pass over the canonical store.
#[derive(Debug)]
pub struct RecordScan {
    store: CanonicalStore,
    entries: Vec<Reference>,
    pos: usize,
}

impl RecordScan {
    /// Read the next record. Files deleted since the listing was taken are skipped.
    pub async fn next(&mut self) -> Option<Result<Record>> {
        while let Some(entry) = self.entries.get(self.pos) {
            self.pos += 1;
            match self.store.read(&entry.record_type, &entry.id).await {
                Err(StoreError::NotFound { .. }) => {
                    tracing::debug!(reference = %entry, "record vanished during scan");
                    continue;
                }
                other => return Some(other),
            }
        }
        None
    }

    /// Rewind to the first record.
    pub fn restart(&mut self) {
        self.pos = 0;
    }

    /// Number of records listed when the scan was created.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn references(&self) -> &[Reference] {
        &self.entries
    }
}
