//! References between records.
//!
//! A reference is a `type-id` string. Records point at others through their `related` list,
//! and bodies may mention references inline. Nothing here is stored separately: every view is
//! recomputed from the canonical store on demand.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::record::{Record, Reference};
use crate::registry::TypeRegistry;
use crate::store::CanonicalStore;

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z][a-z0-9_]*)-([A-Za-z0-9_]+)$").expect("valid reference pattern")
});

/// A run of hyphen-joined words; every adjacent pair in it is a candidate `type-id`.
static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_]+(?:-[A-Za-z0-9_]+)+").expect("valid mention pattern")
});

/// A `related` entry whose target no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingLink {
    pub from: Reference,
    pub to: String,
}

/// Parse `type-id` into a [`Reference`].
pub fn parse_reference(text: &str) -> Result<Reference> {
    let caps = REFERENCE.captures(text.trim()).ok_or_else(|| {
        StoreError::validation(
            "reference",
            format!("'{text}' is not a valid reference (expected type-id, e.g. issues-42)"),
        )
    })?;
    Ok(Reference::new(&caps[1], &caps[2]))
}

pub fn create_reference(record_type: &str, id: impl Display) -> String {
    format!("{record_type}-{id}")
}

/// Check every `related` entry of `record`: well-formed, not the record itself, and pointing at
/// an existing record.
pub async fn validate(record: &Record, store: &CanonicalStore) -> Result<()> {
    validate_changes(record, &[], store).await
}

/// [`validate`] for an edited record. Entries already present in `previous` are not required
/// to resolve, so a link left dangling by an earlier delete does not block unrelated edits.
pub async fn validate_changes(
    record: &Record,
    previous: &[String],
    store: &CanonicalStore,
) -> Result<()> {
    let own = record.reference();
    for entry in &record.related {
        let target = parse_reference(entry)?;
        if target == own {
            return Err(StoreError::validation(
                "related",
                format!("{own} cannot reference itself"),
            ));
        }
        if previous.contains(entry) {
            continue;
        }
        if !store.exists(&target.record_type, &target.id).await? {
            return Err(StoreError::validation(
                "related",
                format!("{target} does not exist"),
            ));
        }
    }
    Ok(())
}

/// References to registered types embedded in `body`, in order of first appearance.
pub fn mentions(body: &str, registry: &TypeRegistry) -> Vec<Reference> {
    let mut seen = BTreeSet::new();
    let mut found = Vec::new();
    for run in MENTION.find_iter(body) {
        let parts: Vec<&str> = run.as_str().split('-').collect();
        for pair in parts.windows(2) {
            if registry.contains(pair[0]) {
                let reference = Reference::new(pair[0], pair[1]);
                if seen.insert(reference.clone()) {
                    found.push(reference);
                }
            }
        }
    }
    found
}

/// Every stored record whose `related` list contains `target`.
pub async fn referrers(target: &Reference, store: &CanonicalStore) -> Result<Vec<Record>> {
    let needle = target.to_string();
    let mut scan = store.scan_all().await?;
    let mut found = Vec::new();
    while let Some(record) = scan.next().await {
        let record = record?;
        if record.related.iter().any(|r| r == &needle) {
            found.push(record);
        }
    }
    Ok(found)
}

/// Entries of `record.related` that are malformed or whose target is missing.
pub async fn broken_links(record: &Record, store: &CanonicalStore) -> Result<Vec<String>> {
    let mut broken = Vec::new();
    for entry in &record.related {
        let exists = match parse_reference(entry) {
            Ok(target) => store.exists(&target.record_type, &target.id).await?,
            Err(_) => false,
        };
        if !exists {
            broken.push(entry.clone());
        }
    }
    Ok(broken)
}

/// Links left dangling by the removal of `target`. Referrers are not modified.
pub async fn on_delete(target: &Reference, store: &CanonicalStore) -> Result<Vec<DanglingLink>> {
    let links: Vec<DanglingLink> = referrers(target, store)
        .await?
        .into_iter()
        .map(|record| DanglingLink {
            from: record.reference(),
            to: target.to_string(),
        })
        .collect();
    for link in &links {
        tracing::warn!(from = %link.from, to = %link.to, "reference left dangling by delete");
    }
    Ok(links)
}

/// Point `record`'s links to `from` at `to` instead, dropping any duplicate that creates.
/// Returns whether anything changed.
pub fn on_retype(record: &mut Record, from: &Reference, to: &Reference) -> bool {
    let old = from.to_string();
    let new = to.to_string();
    if !record.related.contains(&old) {
        return false;
    }
    let mut related = Vec::with_capacity(record.related.len());
    for entry in record.related.drain(..) {
        let entry = if entry == old { new.clone() } else { entry };
        if !related.contains(&entry) {
            related.push(entry);
        }
    }
    record.related = related;
    true
}
