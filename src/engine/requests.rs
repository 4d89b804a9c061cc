//! Typed requests and outcomes for [`super::Dossier`] operations, plus their validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::graph::DanglingLink;
use crate::record::{MetaValue, Priority, Record, Reference, Status};
use crate::registry::BaseShape;

/// Keys a caller may not set through `fields`.
const OWNED_KEYS: &[&str] = &[
    "type",
    "id",
    "title",
    "description",
    "tags",
    "labels",
    "related",
    "links",
    "status",
    "priority",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub title: String,
    pub description: Option<String>,
    pub body: String,
    pub tags: Vec<String>,
    pub related: Vec<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    /// Extra metadata written to the header verbatim.
    pub fields: BTreeMap<String, MetaValue>,
}

impl NewRecord {
    pub fn new(record_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn related<I, S>(mut self, related: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related = related.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecordPatch {
    pub title: Option<String>,
    /// An empty string clears the description.
    pub description: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
    pub related: Option<Vec<String>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    /// Merged into the existing fields; a `Null` value removes the key.
    pub fields: BTreeMap<String, MetaValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteOutcome {
    pub reference: Reference,
    /// Links in other records that now point at nothing.
    pub dangling: Vec<DanglingLink>,
}

pub(crate) fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::validation("title", "must not be empty"));
    }
    single_line("title", title)?;
    Ok(title.to_string())
}

pub(crate) fn validate_description(description: Option<&str>) -> Result<Option<String>> {
    match description.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => {
            single_line("description", text)?;
            Ok(Some(text.to_string()))
        }
    }
}

pub(crate) fn validate_fields(fields: &BTreeMap<String, MetaValue>) -> Result<()> {
    for (key, value) in fields {
        let well_formed = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            && !key.starts_with('-');
        if !well_formed {
            return Err(StoreError::validation(
                "fields",
                format!("'{key}' is not a valid metadata key"),
            ));
        }
        if OWNED_KEYS.contains(&key.as_str()) {
            return Err(StoreError::validation(
                "fields",
                format!("'{key}' is set through its own parameter"),
            ));
        }
        let texts: Vec<String> = match value {
            MetaValue::String(s) => vec![s.clone()],
            MetaValue::List(items) => items.clone(),
            _ => Vec::new(),
        };
        for text in texts {
            single_line(key, &text)?;
        }
    }
    Ok(())
}

/// Set `status`/`priority` on `record` according to its base shape.
///
/// Task records get validated values, falling back to what they already have and then to the
/// defaults. Document records reject both.
pub(crate) fn apply_task_fields(
    record: &mut Record,
    shape: BaseShape,
    status: Option<&str>,
    priority: Option<&str>,
) -> Result<()> {
    match shape {
        BaseShape::Document => {
            for (field, value) in [("status", status), ("priority", priority)] {
                if value.is_some() {
                    return Err(StoreError::validation(
                        field,
                        format!("'{}' records are documents and carry no {field}", record.record_type),
                    ));
                }
            }
        }
        BaseShape::Task => {
            let status = match status {
                Some(s) => s.parse::<Status>()?,
                None => record
                    .status()
                    .and_then(|s| s.parse::<Status>().ok())
                    .unwrap_or_default(),
            };
            let priority = match priority {
                Some(p) => p.parse::<Priority>()?,
                None => record
                    .priority()
                    .and_then(|p| p.parse::<Priority>().ok())
                    .unwrap_or_default(),
            };
            record
                .fields
                .insert("status".into(), MetaValue::from(status.as_str()));
            record
                .fields
                .insert("priority".into(), MetaValue::from(priority.as_str()));
        }
    }
    Ok(())
}

/// Drop workflow fields when a record moves to a document-shaped type.
pub(crate) fn strip_task_fields(record: &mut Record) {
    for key in ["status", "priority"] {
        if record.fields.remove(key).is_some() {
            tracing::debug!(record = %record.reference(), key, "dropping workflow field");
        }
    }
}

fn single_line(field: &str, text: &str) -> Result<()> {
    if text.contains(['\n', '\r']) {
        Err(StoreError::validation(field, "must be a single line"))
    } else {
        Ok(())
    }
}
