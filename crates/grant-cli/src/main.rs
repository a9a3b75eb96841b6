use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "grant-ingest")]
#[command(about = "Reconcile sponsored-programs grants against VIVO and write RDF deltas")]
#[command(version)]
struct Cli {
    /// Delimited grant export; outputs are written next to it.
    input: Option<PathBuf>,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("grant_ingest=info".parse()?))
        .init();

    let cli = Cli::parse();
    let summary = grant_ingest::run_ingest_from_env(cli.input).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "ingest complete: run_id={} add={} update={} vivo_only={} invalid={} additions={} retractions={}",
            summary.run_id,
            summary.counts.add,
            summary.counts.update,
            summary.counts.no_action,
            summary.invalid_records,
            summary.outputs.additions.display(),
            summary.outputs.retractions.display()
        );
    }

    Ok(())
}
