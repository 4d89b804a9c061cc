pub mod doctor;
pub mod search;
pub mod show;
pub mod types;

use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use dossier::resilience::CancelFlag;
use dossier::{Dossier, DossierConfig};

/// Rebuild the index from the record files, with a spinner. Ctrl-C cancels and leaves the
/// previous index in place.
pub async fn rebuild(config: DossierConfig) -> Result<()> {
    let dossier = Dossier::open_for_maintenance(config)
        .await
        .context("failed to open store")?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("scanning record files...");

    let result = dossier
        .rebuild_with_progress(&cancel, |read| {
            pb.set_message(format!("read {read} record(s)"));
        })
        .await;
    pb.finish_and_clear();

    let report = result.context("rebuild failed; the previous index is unchanged")?;
    println!(
        "Rebuilt index: {} record(s) in {:.1}s (schema version {})",
        report.records,
        report.elapsed.as_secs_f64(),
        report.schema_version
    );
    Ok(())
}
