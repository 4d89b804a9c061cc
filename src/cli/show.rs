//! CLI `show` command: display full details for a single record.

use anyhow::{Context, Result};

use dossier::{Dossier, DossierConfig};

/// Show a record by its `type-id` reference, with its links in both directions.
pub async fn show(config: DossierConfig, reference: &str, json: bool) -> Result<()> {
    let dossier = Dossier::open(config).await.context("failed to open store")?;

    let record = dossier.get_reference(reference).await?;
    let backlinks = dossier.backlinks(&record.record_type, &record.id).await?;
    let broken = dossier
        .broken_references(&record.record_type, &record.id)
        .await?;
    let mentions = dossier.mentions(&record.record_type, &record.id).await?;

    if json {
        let out = serde_json::json!({
            "record": record,
            "backlinks": backlinks,
            "broken_references": broken,
            "mentions": mentions,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Record: {}", record.reference());
    println!("{}", "=".repeat(50));
    println!("  Title:          {}", record.title);
    if let Some(ref description) = record.description {
        println!("  Description:    {description}");
    }
    if let Some(status) = record.status() {
        println!("  Status:         {status}");
    }
    if let Some(priority) = record.priority() {
        println!("  Priority:       {priority}");
    }
    if !record.tags.is_empty() {
        let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
        println!("  Tags:           {}", tags.join(", "));
    }
    println!("  Created:        {}", record.created_at);
    println!("  Updated:        {}", record.updated_at);
    for (key, value) in &record.fields {
        if key != "status" && key != "priority" {
            println!("  {:<15} {}", format!("{key}:"), value.to_text());
        }
    }
    println!();
    println!("Body:");
    for line in record.body.lines() {
        println!("  {line}");
    }

    if !record.related.is_empty() {
        println!();
        println!("Related:");
        for link in &record.related {
            let marker = if broken.contains(link) { " (broken)" } else { "" };
            println!("  --> {link}{marker}");
        }
    }
    if !backlinks.is_empty() {
        println!();
        println!("Referenced by:");
        for link in &backlinks {
            println!("  <-- {link}");
        }
    }
    if !mentions.is_empty() {
        println!();
        println!("Mentions:");
        for link in &mentions {
            println!("  ~~> {link}");
        }
    }

    Ok(())
}
