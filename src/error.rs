//! Error taxonomy shared by every storage, index, and query operation.
//!
//! Logical outcomes ([`StoreError::Validation`], [`StoreError::NotFound`],
//! [`StoreError::Conflict`]) are surfaced immediately and never retried. Storage failures carry a
//! [`StorageKind`] so the resilience layer can tell transient contention from hard faults.

use std::fmt;
use std::time::Duration;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// What kind of resource a [`StoreError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Record,
    RecordType,
    Reference,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Record => "record",
            Self::RecordType => "record type",
            Self::Reference => "reference target",
        })
    }
}

/// Sub-classification of storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// The index database is locked by another writer (`SQLITE_BUSY` / `SQLITE_LOCKED`).
    Busy,
    /// Momentary file-system contention (interrupted or would-block I/O).
    Contention,
    /// Any other file-system failure.
    Io,
    /// Any other index failure.
    Index,
    /// Stored data could not be interpreted.
    Corrupt,
}

impl StorageKind {
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Busy | Self::Contention)
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Busy => "busy",
            Self::Contention => "contention",
            Self::Io => "io",
            Self::Index => "index",
            Self::Corrupt => "corrupt",
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Malformed input: bad type name, unresolved reference, invalid field value.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("storage failure during {operation} ({kind}): {message}")]
    Storage {
        operation: String,
        kind: StorageKind,
        message: String,
    },

    /// Fatal at startup; the operator must run `dossier rebuild`.
    #[error("{}", version_mismatch_message(.expected, .found.as_deref()))]
    VersionMismatch {
        expected: String,
        found: Option<String>,
    },

    #[error("{operation} timed out after {}ms", .elapsed.as_millis())]
    Timeout { operation: String, elapsed: Duration },

    #[error("circuit '{name}' is open; refusing call until it resets")]
    CircuitOpen { name: String },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },
}

fn version_mismatch_message(expected: &str, found: Option<&str>) -> String {
    match found {
        Some(found) => format!(
            "index schema version mismatch: index was built by v{found}, this binary is v{expected}. \
             Run `dossier rebuild` to rebuild the index from the record files."
        ),
        None => format!(
            "index has no schema version; it was probably created by an older release. \
             Run `dossier rebuild` to rebuild it for v{expected}."
        ),
    }
}

impl StoreError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn storage(
        operation: impl Into<String>,
        kind: StorageKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            kind,
            message: message.into(),
        }
    }

    /// Wrap a SQLite error, classifying lock contention as [`StorageKind::Busy`].
    pub fn from_sqlite(operation: impl Into<String>, err: rusqlite::Error) -> Self {
        let kind = match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                StorageKind::Busy
            }
            Some(rusqlite::ErrorCode::DatabaseCorrupt) | Some(rusqlite::ErrorCode::NotADatabase) => {
                StorageKind::Corrupt
            }
            _ => StorageKind::Index,
        };
        Self::storage(operation, kind, err.to_string())
    }

    /// Wrap a file-system error, classifying interruptions as [`StorageKind::Contention`].
    pub fn from_io(operation: impl Into<String>, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match err.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                StorageKind::Contention
            }
            _ => StorageKind::Io,
        };
        Self::storage(operation, kind, err.to_string())
    }

    /// Logical outcomes of a well-formed but wrong request. Never retried, never trip a breaker.
    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::NotFound { .. } | Self::Conflict { .. }
        )
    }

    /// Failures worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage { kind, .. } => kind.is_transient(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::from_sqlite("index", err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io("filesystem", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_sqlite_errors_are_transient() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        let err = StoreError::from_sqlite("index.upsert", err);
        assert!(err.is_transient());
        assert!(!err.is_logical());
    }

    #[test]
    fn interrupted_io_is_contention() {
        let err = std::io::Error::new(std::io::ErrorKind::Interrupted, "signal");
        match StoreError::from_io("store.write", err) {
            StoreError::Storage { kind, operation, .. } => {
                assert_eq!(kind, StorageKind::Contention);
                assert_eq!(operation, "store.write");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn logical_errors_are_not_transient() {
        let err = StoreError::not_found(ResourceKind::Record, "issues-1");
        assert!(err.is_logical());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "record not found: issues-1");
    }

    #[test]
    fn version_mismatch_messages_name_versions() {
        let err = StoreError::VersionMismatch {
            expected: "0.3.0".into(),
            found: Some("0.2.0".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.2.0") && msg.contains("0.3.0"));
        assert!(msg.contains("rebuild"));

        let missing = StoreError::VersionMismatch {
            expected: "0.3.0".into(),
            found: None,
        };
        assert!(missing.to_string().contains("older release"));
    }
}
