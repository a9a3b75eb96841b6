//! Grant ingest: reconciles sponsored-programs grant records against a VIVO
//! graph store and writes the RDF additions and retractions that bring the
//! store up to date.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use grant_store::{load_snapshot, GraphStore, MemoryStore, SparqlClientConfig, SparqlStore};
use tracing::info;

pub mod config;
pub mod delta;
pub mod lookup;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod report;

pub use config::IngestConfig;
pub use delta::{DeltaCollector, FinalizedDelta};
pub use normalize::{Problem, ValidationIssue};
pub use pipeline::{IngestPipeline, IngestReport, IngestSummary};
pub use reconcile::{Action, ActionCounts};

pub const CRATE_NAME: &str = "grant-ingest";

/// The fixture store when one is configured, otherwise the SPARQL endpoint.
pub fn store_from_config(config: &IngestConfig) -> Result<Box<dyn GraphStore>> {
    if let Some(path) = &config.store_fixture {
        let snapshot = load_snapshot(path)
            .with_context(|| format!("loading store fixture {}", path.display()))?;
        let store = MemoryStore::from_snapshot(&snapshot)
            .with_context(|| format!("loading store fixture {} into memory", path.display()))?;
        info!(fixture = %path.display(), triples = store.len()?, "using fixture store");
        return Ok(Box::new(store));
    }

    let mut client = SparqlClientConfig::new(config.sparql_endpoint.clone());
    client.email = config.vivo_email.clone();
    client.password = config.vivo_password.clone();
    client.timeout = Duration::from_secs(config.http_timeout_secs);
    client.user_agent = Some(config.user_agent.clone());
    info!(endpoint = %client.endpoint, "using SPARQL store");
    Ok(Box::new(SparqlStore::new(client)?))
}

pub async fn run_ingest_from_env(input: Option<PathBuf>) -> Result<IngestSummary> {
    let mut config = IngestConfig::from_env()?;
    if let Some(input) = input {
        config = config.with_input(input);
    }
    let store = store_from_config(&config)?;
    let pipeline = IngestPipeline::new(config, store);
    Ok(pipeline.run_once().await?.summary)
}
