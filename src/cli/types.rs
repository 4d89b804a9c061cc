//! CLI `types` command.

use anyhow::{Context, Result};

use dossier::{Dossier, DossierConfig};

/// List registered record types with their shapes and on-disk record counts.
pub async fn types(config: DossierConfig) -> Result<()> {
    let dossier = Dossier::open(config).await.context("failed to open store")?;

    println!("{:<20} {:<10} {:>8}  Origin", "Type", "Shape", "Records");
    println!("{}", "-".repeat(50));
    for record_type in dossier.list_types().await {
        let count = dossier
            .store()
            .count(&record_type.name)
            .await
            .with_context(|| format!("failed to count {} records", record_type.name))?;
        let origin = if record_type.builtin {
            "built-in".to_string()
        } else {
            format!("custom ({})", record_type.created_at)
        };
        println!(
            "{:<20} {:<10} {:>8}  {}",
            record_type.name,
            record_type.base_shape.as_str(),
            count,
            origin
        );
    }

    Ok(())
}
