mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dossier::DossierConfig;

#[derive(Parser)]
#[command(name = "dossier", version, about = "File-backed knowledge store with full-text search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the search index from the record files
    Rebuild,
    /// Check the index schema version and report record counts
    Doctor,
    /// Search records (e.g. `title:"bug fix" AND -deprecated`)
    Search {
        /// Query text; empty lists the most recently updated records
        #[arg(default_value = "")]
        query: String,
        /// Only records of this type
        #[arg(long = "type")]
        record_type: Option<String>,
        /// Only task records with this status
        #[arg(long)]
        status: Option<String>,
        /// Only records carrying this tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one record by reference (e.g. `issues-42`)
    Show {
        reference: String,
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered record types
    Types,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = DossierConfig::load()?;

    // Log to stderr so stdout stays clean for --json output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Rebuild => cli::rebuild(config).await?,
        Command::Doctor => cli::doctor::doctor(config).await?,
        Command::Search {
            query,
            record_type,
            status,
            tags,
            limit,
            json,
        } => {
            let filter = dossier::index::SearchFilter {
                record_type,
                status,
                priority: None,
                tags,
                limit: limit.unwrap_or(0),
            };
            cli::search::search(config, &query, filter, json).await?;
        }
        Command::Show { reference, json } => cli::show::show(config, &reference, json).await?,
        Command::Types => cli::types::types(config).await?,
    }

    Ok(())
}
