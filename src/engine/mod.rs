//! The [`Dossier`] context object.
//!
//! Composes the canonical store, search index, type registry, and reference graph behind one
//! async API. Every storage step runs through [`Dossier::guarded`]: bounded by a timeout,
//! retried on transient failures, and short-circuited by a per-dependency circuit breaker.
//!
//! Writes to one record are serialized by a per-`(type, id)` lock; creation additionally holds a
//! per-type scope while it picks the next id. No operation waits for a second record lock while
//! holding one, except a retype taking the freshly allocated target id. Retypes run one at a
//! time. An index gate lets queries and writes share the index while a rebuild holds it
//! exclusively.

pub mod locks;
pub mod requests;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::DossierConfig;
use crate::consistency::{self, RebuildReport};
use crate::db::{self, version};
use crate::error::{ResourceKind, Result, StorageKind, StoreError};
use crate::graph;
use crate::index::{SearchFilter, SearchHit, SearchIndex};
use crate::query::CompiledQuery;
use crate::record::{normalize_tags, Priority, Record, Reference, Status};
use crate::registry::{BaseShape, RecordType, TypeRegistry};
use crate::resilience::{with_retry, with_timeout, CancelFlag, CircuitBreaker, RetryPolicy};
use crate::store::CanonicalStore;

use locks::RecordLocks;
pub use requests::{DeleteOutcome, NewRecord, RecordPatch};
use requests::{
    apply_task_fields, strip_task_fields, validate_description, validate_fields, validate_title,
};

/// Counts reported by `dossier doctor`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DossierStats {
    pub records_on_disk: usize,
    pub records_indexed: usize,
    pub types: usize,
    pub schema_version: Option<String>,
}

pub struct Dossier {
    config: Arc<DossierConfig>,
    store: CanonicalStore,
    index: SearchIndex,
    registry: RwLock<TypeRegistry>,
    gate: RwLock<()>,
    retypes: Mutex<()>,
    locks: RecordLocks,
    retry: RetryPolicy,
    timeout: Duration,
    files_breaker: CircuitBreaker,
    index_breaker: CircuitBreaker,
}

impl Dossier {
    /// Open the store described by `config`.
    ///
    /// A brand-new index is populated from the record files. An existing index must carry the
    /// running version, otherwise this fails with [`StoreError::VersionMismatch`].
    pub async fn open(config: DossierConfig) -> Result<Self> {
        let (dossier, created) = Self::connect(config).await?;
        if !created {
            dossier.verify().await?;
        }
        Ok(dossier)
    }

    /// Open without the version gate, for maintenance commands that inspect or rebuild the
    /// index.
    pub async fn open_for_maintenance(config: DossierConfig) -> Result<Self> {
        let (dossier, _) = Self::connect(config).await?;
        Ok(dossier)
    }

    async fn connect(config: DossierConfig) -> Result<(Self, bool)> {
        let root = config.resolved_root();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::from_io("open", e))?;
        let registry = TypeRegistry::load(&root).await?;

        let index_path = config.resolved_index_path();
        let opened = tokio::task::spawn_blocking(move || db::open_index(&index_path))
            .await
            .map_err(|e| {
                StoreError::storage("index.open", StorageKind::Index, format!("db task failed: {e}"))
            })??;

        let resilience = &config.resilience;
        let retry = resilience.retry_policy();
        let timeout = resilience.operation_timeout();
        let files_breaker = CircuitBreaker::new("files", resilience.breaker_config());
        let index_breaker = CircuitBreaker::new("index", resilience.breaker_config());

        let dossier = Self {
            config: Arc::new(config),
            store: CanonicalStore::new(root),
            index: SearchIndex::new(opened.conn),
            registry: RwLock::new(registry),
            gate: RwLock::new(()),
            retypes: Mutex::new(()),
            locks: RecordLocks::new(),
            retry,
            timeout,
            files_breaker,
            index_breaker,
        };

        if opened.created {
            info!("new index database, building from record files");
            dossier.rebuild(&CancelFlag::new()).await?;
        }
        Ok((dossier, opened.created))
    }

    pub fn config(&self) -> &DossierConfig {
        &self.config
    }

    pub fn store(&self) -> &CanonicalStore {
        &self.store
    }

    /// Check the index's schema version against the running binary.
    pub async fn verify(&self) -> Result<()> {
        consistency::verify_index(&self.index, version::running_version()).await
    }

    // ── Records ─────────────────────────────────────────────────────

    pub async fn create(&self, new: NewRecord) -> Result<Record> {
        let title = validate_title(&new.title)?;
        let description = validate_description(new.description.as_deref())?;
        validate_fields(&new.fields)?;

        let _gate = self.gate.read().await;
        let shape = self.shape_of(&new.record_type).await?;
        let _scope = self.locks.type_scope(&new.record_type).await;
        let id = self
            .guarded("store.next_id", &self.files_breaker, || {
                self.store.next_id(&new.record_type)
            })
            .await?
            .to_string();
        let _lock = self.locks.record(&new.record_type, &id).await;

        let now = now();
        let mut record = Record {
            record_type: new.record_type.clone(),
            id,
            title,
            description,
            body: new.body,
            tags: normalize_tags(&new.tags),
            related: clean_related(new.related),
            fields: new.fields,
            created_at: now.clone(),
            updated_at: now,
        };
        apply_task_fields(
            &mut record,
            shape,
            new.status.as_deref(),
            new.priority.as_deref(),
        )?;
        graph::validate(&record, &self.store).await?;

        self.persist(&record).await?;
        info!(record_type = %record.record_type, id = %record.id, "record created");
        Ok(record)
    }

    pub async fn get(&self, record_type: &str, id: &str) -> Result<Record> {
        self.shape_of(record_type).await?;
        self.read_record(record_type, id).await
    }

    /// Look up a record by its `type-id` reference.
    pub async fn get_reference(&self, reference: &str) -> Result<Record> {
        let reference = graph::parse_reference(reference)?;
        self.get(&reference.record_type, &reference.id).await
    }

    pub async fn update(&self, record_type: &str, id: &str, patch: RecordPatch) -> Result<Record> {
        validate_fields(&patch.fields)?;

        let _gate = self.gate.read().await;
        let shape = self.shape_of(record_type).await?;
        let _lock = self.locks.record(record_type, id).await;
        let mut record = self.read_record(record_type, id).await?;
        let previous = record.related.clone();

        if let Some(title) = &patch.title {
            record.title = validate_title(title)?;
        }
        if let Some(description) = &patch.description {
            record.description = validate_description(Some(description.as_str()))?;
        }
        if let Some(body) = patch.body {
            record.body = body;
        }
        if let Some(tags) = &patch.tags {
            record.tags = normalize_tags(tags);
        }
        if let Some(related) = patch.related {
            record.related = clean_related(related);
        }
        for (key, value) in patch.fields {
            if value.is_null() {
                record.fields.remove(&key);
            } else {
                record.fields.insert(key, value);
            }
        }
        apply_task_fields(
            &mut record,
            shape,
            patch.status.as_deref(),
            patch.priority.as_deref(),
        )?;
        record.updated_at = now();
        graph::validate_changes(&record, &previous, &self.store).await?;

        self.persist(&record).await?;
        info!(record_type, id, "record updated");
        Ok(record)
    }

    /// Remove a record. Records that linked to it keep their links; those are returned as
    /// dangling.
    pub async fn delete(&self, record_type: &str, id: &str) -> Result<DeleteOutcome> {
        let _gate = self.gate.read().await;
        self.shape_of(record_type).await?;
        let _lock = self.locks.record(record_type, id).await;
        let reference = Reference::new(record_type, id);

        let removed = self
            .guarded("store.delete", &self.files_breaker, || {
                self.store.delete(record_type, id)
            })
            .await?;
        // clear any stale index entry even when the file was already gone
        self.guarded("index.remove", &self.index_breaker, || {
            self.index.remove(record_type, id)
        })
        .await?;
        if !removed {
            return Err(StoreError::not_found(
                ResourceKind::Record,
                reference.to_string(),
            ));
        }

        let dangling = graph::on_delete(&reference, &self.store).await?;
        info!(record_type, id, dangling = dangling.len(), "record deleted");
        Ok(DeleteOutcome {
            reference,
            dangling,
        })
    }

    /// Move a record to another type under a fresh id and point every referrer at it.
    pub async fn retype(&self, record_type: &str, id: &str, new_type: &str) -> Result<Reference> {
        if record_type == new_type {
            return Err(StoreError::validation(
                "type",
                format!("{record_type}-{id} is already of type '{new_type}'"),
            ));
        }

        let _gate = self.gate.read().await;
        // retypes run one at a time; a referrer cannot move while its links are rewritten
        let _retype = self.retypes.lock().await;
        let target_shape = {
            let registry = self.registry.read().await;
            registry.resolve(record_type)?;
            registry.resolve(new_type)?
        };

        let (from, to) = self
            .move_record(record_type, id, new_type, target_shape)
            .await?;

        // move locks are released; each referrer is locked on its own
        for referrer in graph::referrers(&from, &self.store).await? {
            let referrer = referrer.reference();
            let _referrer_lock = self.locks.record(&referrer.record_type, &referrer.id).await;
            let mut current = match self.read_record(&referrer.record_type, &referrer.id).await {
                Ok(current) => current,
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            if graph::on_retype(&mut current, &from, &to) {
                current.updated_at = now();
                self.persist(&current).await?;
                info!(record = %referrer, from = %from, to = %to, "reference rewritten");
            }
        }

        info!(from = %from, to = %to, "record retyped");
        Ok(to)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Search with the query language. An empty query lists records matching `filter`.
    pub async fn search(&self, query: &str, mut filter: SearchFilter) -> Result<Vec<SearchHit>> {
        if let Some(record_type) = &filter.record_type {
            self.shape_of(record_type).await?;
        }
        if let Some(status) = &filter.status {
            status.parse::<Status>()?;
        }
        if let Some(priority) = &filter.priority {
            priority.parse::<Priority>()?;
        }
        filter.tags = normalize_tags(&filter.tags).into_iter().collect();
        if filter.limit == 0 {
            filter.limit = self.config.search.default_limit;
        }

        let compiled = CompiledQuery::parse(query);
        debug!(query, compiled = %compiled.text, "search");

        let _gate = self.gate.read().await;
        self.guarded("index.search", &self.index_breaker, || {
            self.index.execute(&compiled, &filter)
        })
        .await
    }

    /// Records whose `related` list points at `type-id`, as currently indexed.
    pub async fn backlinks(&self, record_type: &str, id: &str) -> Result<Vec<Reference>> {
        self.shape_of(record_type).await?;
        let target = Reference::new(record_type, id);
        let _gate = self.gate.read().await;
        self.guarded("index.referrers", &self.index_breaker, || {
            self.index.referrers(&target)
        })
        .await
    }

    /// `related` entries of a record that are malformed or point at missing records.
    pub async fn broken_references(&self, record_type: &str, id: &str) -> Result<Vec<String>> {
        let record = self.get(record_type, id).await?;
        let broken = graph::broken_links(&record, &self.store).await?;
        for link in &broken {
            warn!(record = %record.reference(), link = %link, "broken reference");
        }
        Ok(broken)
    }

    /// References to registered types mentioned in a record's body.
    pub async fn mentions(&self, record_type: &str, id: &str) -> Result<Vec<Reference>> {
        let record = self.get(record_type, id).await?;
        let registry = self.registry.read().await;
        Ok(graph::mentions(&record.body, &registry))
    }

    // ── Types ───────────────────────────────────────────────────────

    pub async fn register_type(&self, name: &str, base_shape: BaseShape) -> Result<RecordType> {
        let mut registry = self.registry.write().await;
        let created = registry.register(name, base_shape)?.clone();
        if let Err(e) = registry.save(self.store.root()).await {
            registry.unregister(name, 0)?;
            return Err(e);
        }
        info!(name, base = %base_shape, "type registered");
        Ok(created)
    }

    /// Remove a custom type. Fails with a conflict while any record of the type exists.
    pub async fn unregister_type(&self, name: &str) -> Result<RecordType> {
        // exclusive so no create can slip a record in while counting
        let _gate = self.gate.write().await;
        let mut registry = self.registry.write().await;
        let in_use = if registry.contains(name) {
            self.store.count(name).await?
        } else {
            0
        };
        let removed = registry.unregister(name, in_use)?;
        if let Err(e) = registry.save(self.store.root()).await {
            registry.restore(removed);
            return Err(e);
        }
        info!(name, "type unregistered");
        Ok(removed)
    }

    pub async fn list_types(&self) -> Vec<RecordType> {
        self.registry.read().await.list().into_iter().cloned().collect()
    }

    // ── Maintenance ─────────────────────────────────────────────────

    /// Regenerate the index from the record files.
    pub async fn rebuild(&self, cancel: &CancelFlag) -> Result<RebuildReport> {
        self.rebuild_with_progress(cancel, |_| {}).await
    }

    /// [`rebuild`](Self::rebuild), reporting the number of records read so far.
    pub async fn rebuild_with_progress<P>(&self, cancel: &CancelFlag, progress: P) -> Result<RebuildReport>
    where
        P: FnMut(usize),
    {
        let _gate = self.gate.write().await;
        consistency::rebuild(&self.store, &self.index, cancel, progress).await
    }

    pub async fn stats(&self) -> Result<DossierStats> {
        let records_on_disk = self.store.scan_all().await?.len();
        let records_indexed = self.index.count().await?;
        let types = self.registry.read().await.list().len();
        let schema_version = self.index.stored_version().await?;
        Ok(DossierStats {
            records_on_disk,
            records_indexed,
            types,
            schema_version,
        })
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Run `op` as `timeout(retry(breaker(op)))`.
    async fn guarded<T, F, Fut>(
        &self,
        operation: &'static str,
        breaker: &CircuitBreaker,
        op: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let op = &op;
        with_timeout(
            self.timeout,
            operation,
            with_retry(&self.retry, move || breaker.call(move || op())),
        )
        .await
    }

    /// Write `record_type-id` under `new_type` with a fresh id and remove the original. Holds the
    /// source lock, the target type's id scope, and the new record's lock only for the move itself.
    async fn move_record(
        &self,
        record_type: &str,
        id: &str,
        new_type: &str,
        target_shape: BaseShape,
    ) -> Result<(Reference, Reference)> {
        let _lock = self.locks.record(record_type, id).await;
        let record = self.read_record(record_type, id).await?;
        let from = record.reference();

        let _scope = self.locks.type_scope(new_type).await;
        let new_id = self
            .guarded("store.next_id", &self.files_breaker, || {
                self.store.next_id(new_type)
            })
            .await?
            .to_string();
        let _target_lock = self.locks.record(new_type, &new_id).await;

        let mut moved = record;
        moved.record_type = new_type.to_string();
        moved.id = new_id;
        moved.updated_at = now();
        match target_shape {
            BaseShape::Document => strip_task_fields(&mut moved),
            BaseShape::Task => apply_task_fields(&mut moved, BaseShape::Task, None, None)?,
        }
        let to = moved.reference();

        self.persist(&moved).await?;
        self.guarded("store.delete", &self.files_breaker, || {
            self.store.delete(record_type, id)
        })
        .await?;
        self.guarded("index.remove", &self.index_breaker, || {
            self.index.remove(record_type, id)
        })
        .await?;
        Ok((from, to))
    }

    async fn shape_of(&self, record_type: &str) -> Result<BaseShape> {
        self.registry.read().await.resolve(record_type)
    }

    async fn read_record(&self, record_type: &str, id: &str) -> Result<Record> {
        self.guarded("store.read", &self.files_breaker, || {
            self.store.read(record_type, id)
        })
        .await
    }

    /// Write the canonical file, then bring the index entry in line with it.
    async fn persist(&self, record: &Record) -> Result<()> {
        let path = self
            .guarded("store.write", &self.files_breaker, || self.store.write(record))
            .await?;
        let indexed = self
            .guarded("index.upsert", &self.index_breaker, || {
                self.index.upsert(record, &path)
            })
            .await;
        if let Err(e) = &indexed {
            warn!(
                record = %record.reference(),
                error = %e,
                "record file written but index update failed; run `dossier rebuild`"
            );
        }
        indexed
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Trim, drop blanks, and dedupe while keeping first-seen order.
fn clean_related(related: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(related.len());
    for entry in related {
        let entry = entry.trim();
        if !entry.is_empty() && !out.iter().any(|e| e == entry) {
            out.push(entry.to_string());
        }
    }
    out
}
