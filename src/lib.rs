//! File-backed knowledge store with a derived full-text index.
//!
//! Every record lives as a plain text file with a metadata header at
//! `<root>/<type>/<type>-<id>.md`; those files are the source of truth. A SQLite FTS5 index is
//! kept alongside for search and can always be regenerated from them.
//!
//! | Type | Shape | Carries |
//! |------|-------|---------|
//! | **issues** | task | status, priority |
//! | **plans** | task | status, priority |
//! | **decisions** | document | free content |
//! | **knowledge** | document | free content |
//! | **sessions** | document | free content |
//!
//! Custom types can be registered at runtime and inherit one of the two shapes.
//!
//! # Architecture
//!
//! - **Storage**: one file per record, written atomically (temp file + rename)
//! - **Search**: SQLite FTS5 over title, body, description, tags, and type, queried with a
//!   small boolean query language (`title:"bug fix" AND -deprecated`)
//! - **Consistency**: the index records the version that built it; a mismatch at startup is
//!   fatal until `dossier rebuild` regenerates it
//! - **Resilience**: storage calls are bounded by timeouts, retried with jittered backoff, and
//!   guarded by circuit breakers
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`engine`]: The [`Dossier`] context object tying everything together
//! - [`record`]: Record model and the metadata-header file codec
//! - [`query`]: Query language parser and compiler
//! - [`registry`]: Record types and their persistence
//! - [`store`]: Canonical record files
//! - [`index`]: Derived FTS5 search index
//! - [`graph`]: `type-id` references between records
//! - [`consistency`]: Schema version gate and full rebuild
//! - [`resilience`]: Retry, circuit breaker, timeout, cancellation
//! - [`db`]: SQLite connection setup and index schema

pub mod config;
pub mod consistency;
pub mod db;
pub mod engine;
pub mod error;
pub mod graph;
pub mod index;
pub mod query;
pub mod record;
pub mod registry;
pub mod resilience;
pub mod store;

pub use config::DossierConfig;
pub use engine::{DeleteOutcome, Dossier, NewRecord, RecordPatch};
pub use error::{Result, StoreError};
