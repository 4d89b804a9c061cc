//! Core record type definitions.
//!
//! Defines [`MetaValue`] (the closed set of metadata value shapes), [`Record`] (a full record),
//! [`Reference`] (a parsed `type-id` pointer), and the task-shape enums [`Status`] and
//! [`Priority`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::codec::{format_number, Metadata};
use crate::error::{Result, StoreError};

/// A single decoded metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
    Numbers(Vec<f64>),
    Null,
}

impl MetaValue {
    /// Flatten to display text. Lists join with `", "`, `Null` is empty.
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => b.to_string(),
            Self::List(items) => items.join(", "),
            Self::Numbers(ns) => ns
                .iter()
                .map(|n| format_number(*n))
                .collect::<Vec<_>>()
                .join(", "),
            Self::Null => String::new(),
        }
    }

    /// Interpret as a list of strings. Scalars become single-item lists.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            Self::Numbers(ns) => ns.iter().map(|n| format_number(*n)).collect(),
            Self::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Null => Vec::new(),
            other => vec![other.to_text()],
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// Workflow state of a task-shaped record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Done,
    Closed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "done" => Ok(Self::Done),
            "closed" => Ok(Self::Closed),
            _ => Err(StoreError::validation(
                "status",
                format!("unknown status '{s}' (expected open, in_progress, blocked, done, closed)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(StoreError::validation(
                "priority",
                format!("unknown priority '{s}' (expected low, medium, high, critical)"),
            )),
        }
    }
}

/// A parsed `type-id` pointer to another record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub record_type: String,
    pub id: String,
}

impl Reference {
    pub fn new(record_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.record_type, self.id)
    }
}

/// Metadata keys owned by [`Record`] itself rather than `fields`.
const RESERVED_KEYS: &[&str] = &[
    "type",
    "id",
    "title",
    "description",
    "tags",
    "labels",
    "related",
    "links",
    "created_at",
    "updated_at",
];

/// A stored record: metadata block plus body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub record_type: String,
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub body: String,
    /// Normalized tags (see [`normalize_tag`]); the set keeps them sorted and unique.
    pub tags: BTreeSet<String>,
    /// Ordered `type-id` references.
    pub related: Vec<String>,
    /// Type-specific metadata: `status`, `priority`, and any extra keys from the file.
    pub fields: BTreeMap<String, MetaValue>,
    pub created_at: String,
    pub updated_at: String,
}

impl Record {
    pub fn reference(&self) -> Reference {
        Reference::new(&self.record_type, &self.id)
    }

    pub fn status(&self) -> Option<&str> {
        match self.fields.get("status") {
            Some(MetaValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn priority(&self) -> Option<&str> {
        match self.fields.get("priority") {
            Some(MetaValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Build the metadata block for this record.
    pub fn to_metadata(&self) -> Metadata {
        let mut meta: Metadata = self
            .fields
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        meta.insert("type".into(), MetaValue::String(self.record_type.clone()));
        meta.insert("id".into(), id_value(&self.id));
        meta.insert("title".into(), MetaValue::String(self.title.clone()));
        if let Some(description) = &self.description {
            meta.insert("description".into(), MetaValue::String(description.clone()));
        }
        meta.insert(
            "tags".into(),
            MetaValue::List(self.tags.iter().cloned().collect()),
        );
        meta.insert("related".into(), MetaValue::List(self.related.clone()));
        meta.insert("created_at".into(), MetaValue::String(self.created_at.clone()));
        meta.insert("updated_at".into(), MetaValue::String(self.updated_at.clone()));
        meta
    }

    /// Rebuild a record from decoded metadata. `record_type` and `id` come from the file's
    /// location, which wins over whatever the header claims.
    pub fn from_metadata(record_type: &str, id: &str, meta: &Metadata, body: String) -> Self {
        let text = |key: &str| {
            meta.get(key)
                .map(MetaValue::to_text)
                .filter(|s| !s.is_empty())
        };

        let mut tags = BTreeSet::new();
        for key in ["tags", "labels"] {
            if let Some(value) = meta.get(key) {
                tags.extend(value.to_list().iter().filter_map(|t| normalize_tag(t)));
            }
        }

        let mut related: Vec<String> = Vec::new();
        for key in ["related", "links"] {
            if let Some(value) = meta.get(key) {
                for entry in value.to_list() {
                    if !related.contains(&entry) {
                        related.push(entry);
                    }
                }
            }
        }

        let fields = meta
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| match (k.as_str(), v) {
                // status/priority are compared as strings everywhere else
                ("status" | "priority", v) if !v.is_null() => (k.clone(), MetaValue::String(v.to_text())),
                _ => (k.clone(), v.clone()),
            })
            .collect();

        let created_at = text("created_at").unwrap_or_default();
        let updated_at = text("updated_at").unwrap_or_else(|| created_at.clone());

        Self {
            record_type: record_type.to_string(),
            id: id.to_string(),
            title: text("title").unwrap_or_else(|| format!("{record_type}-{id}")),
            description: text("description"),
            body,
            tags,
            related,
            fields,
            created_at,
            updated_at,
        }
    }
}

fn id_value(id: &str) -> MetaValue {
    match id.parse::<u64>() {
        Ok(n) if n.to_string() == id => MetaValue::Number(n as f64),
        _ => MetaValue::String(id.to_string()),
    }
}

/// Normalize a tag: lowercase, whitespace and stray punctuation folded to `-`, edges trimmed.
/// Returns `None` for tags that are empty after normalization.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalize a batch of tags into the sorted, deduplicated form records store.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .filter_map(|t| normalize_tag(t.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::codec;

    fn sample() -> Record {
        let mut fields = BTreeMap::new();
        fields.insert("status".into(), MetaValue::from("open"));
        fields.insert("priority".into(), MetaValue::from("high"));
        fields.insert("estimate".into(), MetaValue::Number(3.0));
        Record {
            record_type: "issues".into(),
            id: "7".into(),
            title: "Login fails, sometimes".into(),
            description: Some("Safari only".into()),
            body: "Steps to reproduce\n".into(),
            tags: normalize_tags(["Auth", "bug"]),
            related: vec!["decisions-2".into()],
            fields,
            created_at: "2026-01-01T00:00:00+00:00".into(),
            updated_at: "2026-01-02T00:00:00+00:00".into(),
        }
    }

    #[test]
    fn normalize_tag_folds_case_and_punctuation() {
        assert_eq!(normalize_tag("Front End").as_deref(), Some("front-end"));
        assert_eq!(normalize_tag("  C++ / Rust ").as_deref(), Some("c-rust"));
        assert_eq!(normalize_tag("snake_case").as_deref(), Some("snake_case"));
        assert_eq!(normalize_tag("!!!"), None);
    }

    #[test]
    fn normalize_tags_dedups_and_sorts() {
        let tags = normalize_tags(["bug", "Auth", "BUG", ""]);
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["auth", "bug"]);
    }

    #[test]
    fn record_survives_file_round_trip() {
        let record = sample();
        let text = codec::encode(&record.to_metadata(), &record.body);
        let (meta, body) = codec::decode(&text);
        let decoded = Record::from_metadata("issues", "7", &meta, body);

        // a comma in the title turns it into a list on disk; it reads back joined
        assert_eq!(decoded.title, "Login fails, sometimes");
        assert_eq!(decoded.description, record.description);
        assert_eq!(decoded.tags, record.tags);
        assert_eq!(decoded.related, record.related);
        assert_eq!(decoded.status(), Some("open"));
        assert_eq!(decoded.priority(), Some("high"));
        assert_eq!(decoded.fields["estimate"], MetaValue::Number(3.0));
        assert_eq!(decoded.created_at, record.created_at);
        assert_eq!(decoded.body, record.body);
    }

    #[test]
    fn legacy_aliases_merge_into_tags_and_related() {
        let (meta, body) =
            codec::decode("---\nlabels: [UI, bug]\ntags: bug\nlinks: issues-1, issues-2\n---\n");
        let record = Record::from_metadata("plans", "3", &meta, body);
        assert_eq!(record.tags.iter().collect::<Vec<_>>(), vec!["bug", "ui"]);
        assert_eq!(record.related, vec!["issues-1", "issues-2"]);
        assert!(!record.fields.contains_key("labels"));
        assert_eq!(record.title, "plans-3");
    }

    #[test]
    fn status_and_priority_parse() {
        assert_eq!("in_progress".parse::<Status>().unwrap(), Status::InProgress);
        assert!("wip".parse::<Status>().is_err());
        assert!(Priority::Critical > Priority::Low);
        assert!(matches!(
            "urgent".parse::<Priority>(),
            Err(StoreError::Validation { .. })
        ));
    }
}
