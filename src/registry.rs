//! Record types.
//!
//! Every type inherits one of two [`BaseShape`]s. Built-in types are always present; custom
//! types are created at runtime and persisted to `types.toml` at the storage root.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ResourceKind, Result, StoreError};

static TYPE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid type-name pattern"));

/// Built-in types seeded on first run.
pub const BUILTIN_TYPES: &[(&str, BaseShape)] = &[
    ("issues", BaseShape::Task),
    ("plans", BaseShape::Task),
    ("decisions", BaseShape::Document),
    ("knowledge", BaseShape::Document),
    ("sessions", BaseShape::Document),
];

/// File name of the persisted registry, relative to the storage root.
pub const REGISTRY_FILE: &str = "types.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseShape {
    /// Workflow records carrying `status` and `priority`.
    Task,
    /// Free content only.
    Document,
}

impl BaseShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for BaseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BaseShape {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "task" => Ok(Self::Task),
            "document" => Ok(Self::Document),
            _ => Err(StoreError::validation(
                "base_shape",
                format!("unknown base shape '{s}' (expected task or document)"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    #[serde(rename = "base")]
    pub base_shape: BaseShape,
    pub created_at: String,
    #[serde(skip)]
    pub builtin: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    types: Vec<RecordType>,
}

/// Check a type name against `^[a-z][a-z0-9_]*$`.
pub fn validate_type_name(name: &str) -> Result<()> {
    if TYPE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(StoreError::validation(
            "type",
            format!(
                "'{name}' must start with a lowercase letter and contain only lowercase letters, digits, or underscores"
            ),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: BTreeMap<String, RecordType>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    pub fn with_builtins() -> Self {
        let created_at = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH.to_rfc3339();
        let types = BUILTIN_TYPES
            .iter()
            .map(|(name, shape)| {
                (
                    name.to_string(),
                    RecordType {
                        name: name.to_string(),
                        base_shape: *shape,
                        created_at: created_at.clone(),
                        builtin: true,
                    },
                )
            })
            .collect();
        Self { types }
    }

    /// Load built-ins plus any custom types persisted under `root`.
    pub async fn load(root: &Path) -> Result<Self> {
        let mut registry = Self::with_builtins();
        let path = root.join(REGISTRY_FILE);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(registry),
            Err(e) => return Err(StoreError::from_io("registry.load", e)),
        };
        let file: RegistryFile = toml::from_str(&contents).map_err(|e| {
            StoreError::storage(
                "registry.load",
                crate::error::StorageKind::Corrupt,
                format!("{}: {e}", path.display()),
            )
        })?;
        for entry in file.types {
            if validate_type_name(&entry.name).is_err() || registry.types.contains_key(&entry.name) {
                tracing::warn!(name = %entry.name, "skipping invalid or duplicate type in registry file");
                continue;
            }
            registry.types.insert(entry.name.clone(), entry);
        }
        tracing::debug!(count = registry.types.len(), "type registry loaded");
        Ok(registry)
    }

    /// Persist custom types to `root/types.toml` (temp file + rename).
    pub async fn save(&self, root: &Path) -> Result<()> {
        let file = RegistryFile {
            types: self.types.values().filter(|t| !t.builtin).cloned().collect(),
        };
        let contents = toml::to_string_pretty(&file).map_err(|e| {
            StoreError::storage("registry.save", crate::error::StorageKind::Io, e.to_string())
        })?;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| StoreError::from_io("registry.save", e))?;
        let path = root.join(REGISTRY_FILE);
        let tmp = path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| StoreError::from_io("registry.save", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::from_io("registry.save", e))?;
        Ok(())
    }

    pub fn register(&mut self, name: &str, base_shape: BaseShape) -> Result<&RecordType> {
        validate_type_name(name)?;
        if self.types.contains_key(name) {
            return Err(StoreError::conflict(format!("type '{name}' already exists")));
        }
        let record_type = RecordType {
            name: name.to_string(),
            base_shape,
            created_at: chrono::Utc::now().to_rfc3339(),
            builtin: false,
        };
        Ok(self.types.entry(name.to_string()).or_insert(record_type))
    }

    /// Remove a custom type. `in_use` is the number of stored records of that type.
    pub fn unregister(&mut self, name: &str, in_use: usize) -> Result<RecordType> {
        let existing = self
            .types
            .get(name)
            .ok_or_else(|| StoreError::not_found(ResourceKind::RecordType, name))?;
        if existing.builtin {
            return Err(StoreError::validation(
                "type",
                format!("'{name}' is a built-in type and cannot be removed"),
            ));
        }
        if in_use > 0 {
            return Err(StoreError::conflict(format!(
                "type '{name}' still has {in_use} record(s)"
            )));
        }
        self.types
            .remove(name)
            .ok_or_else(|| StoreError::not_found(ResourceKind::RecordType, name))
    }

    /// Put back a type removed by [`unregister`](Self::unregister), e.g. when persisting failed.
    pub(crate) fn restore(&mut self, record_type: RecordType) {
        self.types.insert(record_type.name.clone(), record_type);
    }

    pub fn resolve(&self, name: &str) -> Result<BaseShape> {
        self.get(name).map(|t| t.base_shape)
    }

    pub fn get(&self, name: &str) -> Result<&RecordType> {
        self.types
            .get(name)
            .ok_or_else(|| StoreError::not_found(ResourceKind::RecordType, name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// All types, built-ins first, then by name.
    pub fn list(&self) -> Vec<&RecordType> {
        let mut types: Vec<&RecordType> = self.types.values().collect();
        types.sort_by(|a, b| b.builtin.cmp(&a.builtin).then_with(|| a.name.cmp(&b.name)));
        types
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(registry.resolve("issues").unwrap(), BaseShape::Task);
        assert_eq!(registry.resolve("knowledge").unwrap(), BaseShape::Document);
        assert!(matches!(
            registry.resolve("widgets"),
            Err(StoreError::NotFound { kind: ResourceKind::RecordType, .. })
        ));
    }

    #[test]
    fn register_validates_names() {
        let mut registry = TypeRegistry::with_builtins();
        for bad in ["", "1abc", "Upper", "has-dash", "sp ace", "_lead"] {
            assert!(
                matches!(registry.register(bad, BaseShape::Document), Err(StoreError::Validation { .. })),
                "{bad:?} should be rejected"
            );
        }
        let created = registry.register("experiments_v2", BaseShape::Task).unwrap();
        assert!(!created.builtin);
        assert_eq!(registry.resolve("experiments_v2").unwrap(), BaseShape::Task);
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = TypeRegistry::with_builtins();
        assert!(matches!(
            registry.register("issues", BaseShape::Task),
            Err(StoreError::Conflict { .. })
        ));
    }

    #[test]
    fn unregister_rules() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register("recipes", BaseShape::Document).unwrap();

        assert!(matches!(
            registry.unregister("recipes", 1),
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            registry.unregister("issues", 0),
            Err(StoreError::Validation { .. })
        ));
        assert!(matches!(
            registry.unregister("nope", 0),
            Err(StoreError::NotFound { .. })
        ));

        registry.unregister("recipes", 0).unwrap();
        assert!(!registry.contains("recipes"));
    }

    #[test]
    fn list_puts_builtins_first() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register("aardvarks", BaseShape::Document).unwrap();
        let names: Vec<&str> = registry.list().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.last(), Some(&"aardvarks"));
        assert_eq!(names[0], "decisions");
    }

    #[tokio::test]
    async fn custom_types_persist() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut registry = TypeRegistry::load(tmp.path()).await.unwrap();
        registry.register("recipes", BaseShape::Document).unwrap();
        registry.save(tmp.path()).await.unwrap();

        let reloaded = TypeRegistry::load(tmp.path()).await.unwrap();
        assert_eq!(reloaded.resolve("recipes").unwrap(), BaseShape::Document);
        assert!(reloaded.get("issues").unwrap().builtin);
        assert!(!reloaded.get("recipes").unwrap().builtin);
    }
}
