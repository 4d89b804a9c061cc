//! CLI `doctor` command: check the index version gate and print a health report.

use anyhow::{Context, Result};

use dossier::db::version;
use dossier::{Dossier, DossierConfig, StoreError};

/// Run diagnostics and print a health report.
pub async fn doctor(config: DossierConfig) -> Result<()> {
    let root = config.resolved_root();
    let index_path = config.resolved_index_path();

    if !index_path.exists() {
        println!("Index: not found at {}", index_path.display());
        println!("Run `dossier rebuild` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&index_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let dossier = Dossier::open_for_maintenance(config)
        .await
        .context("failed to open index (may be corrupt)")?;
    let stats = dossier.stats().await.context("failed to collect counts")?;

    println!("Dossier Health Report");
    println!("=====================");
    println!();
    println!("Records:           {}", root.display());
    println!("Index:             {}", index_path.display());
    println!("Index size:        {}", format_bytes(file_size));
    println!();
    println!("Schema version:");
    println!("  Stored:          {}", stats.schema_version.as_deref().unwrap_or("(not set)"));
    println!("  Running:         {}", version::running_version());
    match dossier.verify().await {
        Ok(()) => println!("  Status:          OK (match)"),
        Err(StoreError::VersionMismatch { .. }) => {
            println!("  WARNING: version mismatch! Run `dossier rebuild` to regenerate the index.");
        }
        Err(e) => return Err(e).context("failed to read schema version"),
    }
    println!();
    println!("Counts:");
    println!("  Record files:    {}", stats.records_on_disk);
    println!("  Indexed:         {}", stats.records_indexed);
    println!("  Types:           {}", stats.types);
    if stats.records_on_disk != stats.records_indexed {
        println!();
        println!("Index is out of step with the record files. Run `dossier rebuild`.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
