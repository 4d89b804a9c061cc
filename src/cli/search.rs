//! CLI `search` command.

use anyhow::{Context, Result};

use dossier::index::SearchFilter;
use dossier::{Dossier, DossierConfig};

/// Run a query and print the hits, best first.
pub async fn search(config: DossierConfig, query: &str, filter: SearchFilter, json: bool) -> Result<()> {
    let dossier = Dossier::open(config).await.context("failed to open store")?;
    let hits = dossier.search(query, filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let mut badges = Vec::new();
        if let Some(ref status) = hit.status {
            badges.push(status.clone());
        }
        if let Some(ref priority) = hit.priority {
            badges.push(priority.clone());
        }
        let badges = if badges.is_empty() {
            String::new()
        } else {
            format!(" [{}]", badges.join(", "))
        };
        println!(
            "{}. {} {}{} (score: {:.3})",
            i + 1,
            hit.reference(),
            hit.title,
            badges,
            hit.score
        );
        if let Some(ref description) = hit.description {
            println!("   {description}");
        }
        if !hit.tags.is_empty() {
            println!("   tags: {}", hit.tags.join(", "));
        }
        println!("   {}", hit.path);
        println!();
    }

    Ok(())
}
