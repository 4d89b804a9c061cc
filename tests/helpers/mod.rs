#![allow(dead_code)]

use std::path::Path;

use dossier::{Dossier, DossierConfig, NewRecord};
use tempfile::TempDir;

/// Config rooted in `dir` with short resilience bounds so failing tests fail fast.
pub fn test_config(dir: &Path) -> DossierConfig {
    let mut config = DossierConfig::with_root(dir);
    config.resilience.initial_delay_ms = 1;
    config.resilience.max_delay_ms = 5;
    config.resilience.operation_timeout_ms = 5_000;
    config
}

/// Open a fresh store in a temporary directory. Keep the `TempDir` alive for the test's duration.
pub async fn test_dossier() -> (TempDir, Dossier) {
    let tmp = TempDir::new().unwrap();
    let dossier = Dossier::open(test_config(tmp.path())).await.unwrap();
    (tmp, dossier)
}

/// Reopen the store rooted at `dir`, as a restarted process would.
pub async fn reopen(dir: &Path) -> Dossier {
    Dossier::open(test_config(dir)).await.unwrap()
}

/// Create an `issues` record and return its id.
pub async fn create_issue(dossier: &Dossier, title: &str, body: &str) -> String {
    dossier
        .create(NewRecord::new("issues", title).body(body))
        .await
        .unwrap()
        .id
}

/// Write a record file straight to disk, bypassing the engine.
pub fn write_record_file(root: &Path, record_type: &str, id: &str, header: &str, body: &str) {
    let dir = root.join(record_type);
    std::fs::create_dir_all(&dir).unwrap();
    let text = format!("---\n{header}\n---\n{body}");
    std::fs::write(dir.join(format!("{record_type}-{id}.md")), text).unwrap();
}
