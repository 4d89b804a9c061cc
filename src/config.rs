use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::resilience::{BreakerConfig, RetryPolicy};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DossierConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub resilience: ResilienceConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one sub-directory of record files per type.
    pub root: String,
    /// Index database file. Defaults to `<root>/.index/index.db`.
    pub index_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResilienceConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub operation_timeout_ms: u64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = default_dossier_dir()
            .join("records")
            .to_string_lossy()
            .into_owned();
        Self {
            root,
            index_path: None,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 50,
            max_delay_ms: 2000,
            backoff_factor: 2.0,
            jitter: true,
            operation_timeout_ms: 10_000,
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 30_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: crate::index::DEFAULT_LIMIT,
        }
    }
}

impl ResilienceConfig {
    /// Retry policy for storage operations: only transient failures are retried.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            jitter: self.jitter,
            ..RetryPolicy::default()
        }
        .transient_only()
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.max(1),
            success_threshold: self.success_threshold.max(1),
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Returns `~/.dossier/`
pub fn default_dossier_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dossier")
}

/// Returns the default config file path: `~/.dossier/config.toml`
pub fn default_config_path() -> PathBuf {
    default_dossier_dir().join("config.toml")
}

impl DossierConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            DossierConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Config rooted at `root` with every other setting at its default. Ignores the environment.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let mut config = Self::default();
        config.storage.root = root.as_ref().to_string_lossy().into_owned();
        config
    }

    /// Apply environment variable overrides (DOSSIER_ROOT, DOSSIER_INDEX, DOSSIER_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DOSSIER_ROOT") {
            self.storage.root = val;
        }
        if let Ok(val) = std::env::var("DOSSIER_INDEX") {
            self.storage.index_path = Some(val);
        }
        if let Ok(val) = std::env::var("DOSSIER_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the storage root, expanding `~` if needed.
    pub fn resolved_root(&self) -> PathBuf {
        expand_tilde(&self.storage.root)
    }

    /// Resolve the index database path.
    pub fn resolved_index_path(&self) -> PathBuf {
        match &self.storage.index_path {
            Some(path) => expand_tilde(path),
            None => self.resolved_root().join(".index").join("index.db"),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
