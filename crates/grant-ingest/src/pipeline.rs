//! Run driver: one full ingest pass from source file to RDF documents.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use grant_core::UriMinter;
use grant_source::read_source_file;
use grant_store::GraphStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::delta::{DeltaCollector, FinalizedDelta};
use crate::lookup::{build_lookups, Lookups};
use crate::normalize::Normalizer;
use crate::reconcile::{
    classify, grant_creation_triples, grant_update, Action, ActionCounts, HarvestStamp,
    ReconcileError,
};
use crate::report::{write_atomically, ExceptionLog, OutputPaths, RunLog, WrittenArtifact};

/// Decides which classified keys are processed this run.
#[derive(Debug)]
pub struct Sampler {
    rate: f64,
    rng: Option<StdRng>,
}

impl Sampler {
    /// At a rate of 1.0 or more every key is kept and no random numbers are drawn.
    pub fn new(rate: f64) -> Self {
        let rng = (rate < 1.0).then(StdRng::from_os_rng);
        Self { rate, rng }
    }

    pub fn seeded(rate: f64, seed: u64) -> Self {
        let rng = (rate < 1.0).then(|| StdRng::seed_from_u64(seed));
        Self { rate, rng }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        match config.sample_seed {
            Some(seed) => Self::seeded(config.sample_rate, seed),
            None => Self::new(config.sample_rate),
        }
    }

    pub fn keep(&mut self) -> bool {
        match self.rng.as_mut() {
            Some(rng) => rng.random::<f64>() <= self.rate,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input: PathBuf,
    pub source_rows: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub issues: usize,
    /// Every classified key, sampled or not.
    pub classified: ActionCounts,
    /// Keys actually processed, plus how many sampling skipped.
    pub counts: ActionCounts,
    pub additions: usize,
    pub retractions: usize,
    pub outputs: OutputPaths,
    pub artifacts: Vec<WrittenArtifact>,
}

/// Summary plus the in-memory delta, so callers can apply it to a store.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub summary: IngestSummary,
    pub delta: FinalizedDelta,
}

pub struct IngestPipeline<S> {
    config: IngestConfig,
    store: S,
}

impl<S: GraphStore> IngestPipeline<S> {
    pub fn new(config: IngestConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub async fn run_once(&self) -> Result<IngestReport> {
        let run_id = Uuid::new_v4();
        self.run(run_id).await
    }

    #[instrument(name = "ingest_run", skip(self), fields(input = %self.config.input.display()))]
    async fn run(&self, run_id: Uuid) -> Result<IngestReport> {
        let started_at = Utc::now();
        let config = &self.config;
        let outputs = OutputPaths::for_input(&config.input);

        let mut log = RunLog::create(&outputs.log).await?;
        let mut exceptions = ExceptionLog::create(&outputs.exceptions).await?;
        log.line("Start").await?;
        log.line(format!("Grant ingest {}", grant_core::INGEST_VERSION)).await?;
        log.line(format!("Input file {}", config.input.display())).await?;
        log.line(format!("Graph store {}", self.store.describe())).await?;

        let Lookups {
            references,
            mut supporting,
            grants,
        } = build_lookups(&self.store, &mut log)
            .await
            .context("building lookup dictionaries")?;

        log.line("Read source data").await?;
        let rows = read_source_file(&config.input, config.delimiter)
            .with_context(|| format!("reading source file {}", config.input.display()))?;
        log.line(format!("Source file has {} rows", rows.len())).await?;

        let minter = UriMinter::new(config.namespace.clone());
        let mut delta = DeltaCollector::new();

        let outcome =
            Normalizer::new(&references, &mut supporting, &minter, &mut delta).normalize_all(&rows);
        for issue in &outcome.issues {
            exceptions.record(issue).await?;
        }
        exceptions.flush().await?;
        log.line(format!(
            "Source dictionary has {} valid grants, {} invalid records",
            outcome.grants.len(),
            outcome.error_count
        ))
        .await?;
        info!(
            valid = outcome.grants.len(),
            invalid = outcome.error_count,
            issues = outcome.issues.len(),
            "normalized source rows"
        );

        let actions = classify(outcome.grants.keys(), grants.keys());
        let classified: ActionCounts = actions.values().copied().collect();
        log.line(format!("Case 1: Add {}", classified.add)).await?;
        log.line(format!("Case 2: VIVO only {}", classified.no_action)).await?;
        log.line(format!("Case 3: Update {}", classified.update)).await?;
        log.line(format!("Invalid records {}", outcome.error_count)).await?;

        let mut sampler = Sampler::from_config(config);
        if config.sampling_enabled() {
            log.line(format!("Sampling at rate {}", config.sample_rate)).await?;
        }
        let harvest = HarvestStamp::new(Local::now().date_naive());
        let mut counts = ActionCounts::default();

        log.line("Begin Processing").await?;

        for (pcn, action) in &actions {
            if !sampler.keep() {
                counts.sampled_out += 1;
                continue;
            }
            counts.record(*action);
            match action {
                Action::Add => {
                    let record = outcome
                        .grants
                        .get(pcn)
                        .ok_or_else(|| ReconcileError::MissingSourceRecord(pcn.clone()))?;
                    let grant = minter.grant(pcn);
                    delta.add(grant_creation_triples(&grant, record, &minter, &harvest));
                    log.line(format!("{pcn} Case 1: Add {grant}")).await?;
                }
                Action::Update => {
                    let record = outcome
                        .grants
                        .get(pcn)
                        .ok_or_else(|| ReconcileError::MissingSourceRecord(pcn.clone()))?;
                    let grant = grants
                        .get(pcn)
                        .ok_or_else(|| ReconcileError::MissingGrantRef(pcn.clone()))?;
                    let stored = self
                        .store
                        .fetch_grant(grant)
                        .await
                        .map_err(ReconcileError::from)?;
                    let changes = grant_update(grant, record, &stored, &minter);
                    if changes.is_empty() {
                        log.line(format!("{pcn} Case 3: Update {grant}")).await?;
                    } else {
                        log.line(format!(
                            "{pcn} Case 3: Update {grant} changed {}",
                            changes.changed_fields.join(", ")
                        ))
                        .await?;
                    }
                    delta.retract(changes.retractions);
                    delta.add(changes.additions);
                }
                Action::NoAction => {}
            }
        }

        let delta = delta.finalize();
        let additions_rdf = delta.additions_document().context("rendering additions")?;
        let retractions_rdf = delta.retractions_document().context("rendering retractions")?;
        let artifacts = vec![
            write_atomically(&outputs.additions, additions_rdf.as_bytes()).await?,
            write_atomically(&outputs.retractions, retractions_rdf.as_bytes()).await?,
        ];

        if config.sampling_enabled() {
            log.line(format!("Sampled out {}", counts.sampled_out)).await?;
        }
        log.line(format!(
            "Additions {} triples, retractions {} triples",
            delta.additions.len(),
            delta.retractions.len()
        ))
        .await?;
        for artifact in &artifacts {
            log.line(format!(
                "Wrote {} ({} bytes, sha256 {})",
                artifact.path.display(),
                artifact.bytes,
                artifact.sha256
            ))
            .await?;
        }
        log.line("End").await?;

        let finished_at = Utc::now();
        info!(
            %run_id,
            add = counts.add,
            no_action = counts.no_action,
            update = counts.update,
            sampled_out = counts.sampled_out,
            "ingest run finished"
        );

        Ok(IngestReport {
            summary: IngestSummary {
                run_id,
                started_at,
                finished_at,
                input: config.input.clone(),
                source_rows: rows.len(),
                valid_records: outcome.grants.len(),
                invalid_records: outcome.error_count,
                issues: exceptions.written(),
                classified,
                counts,
                additions: delta.additions.len(),
                retractions: delta.retractions.len(),
                outputs,
                artifacts,
            },
            delta,
        })
    }
}
