use std::path::{Path, PathBuf};

use ctqmc_bath::{load_hybridization, HybLink, HybMatrix, LinkParams};
use ctqmc_core::{Measurements, QmcError, SchemaVersion};
use ctqmc_trace::{SegmentTrace, TraceParams};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chain::{AcceptanceSummary, ChainParams, MarkovChain};
use crate::checkpoint::{checkpoint_path, RestoreOutcome};
use crate::config::RunConfig;
use crate::manifest::{manifest_path, provenance, WorkerManifest};

/// Chain assembled from the reference collaborators.
pub type SegmentChain = MarkovChain<SegmentTrace, HybMatrix, HybLink>;

/// Files and statistics produced by [`run_worker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Measurement series.
    pub measurements_path: PathBuf,
    /// Checkpoint for the next run.
    pub checkpoint_path: PathBuf,
    /// Worker manifest.
    pub manifest_path: PathBuf,
    /// Number of stores emitted.
    pub stores: usize,
    /// How the chain started.
    pub restore: RestoreOutcome,
    /// Acceptance statistics.
    pub acceptance: AcceptanceSummary,
}

/// Per-worker measurement file location.
pub fn measurements_path(root: &Path, rank: u64) -> PathBuf {
    root.join(format!("measurements_{rank}.json"))
}

/// Builds the segment chain described by `config` for worker `rank`.
pub fn build_chain(config: &RunConfig, rank: u64) -> Result<SegmentChain, QmcError> {
    config.validate()?;
    let n_site = config.n_site();
    let entries = load_hybridization(&config.hybridization_file)?;
    let link = HybLink::new(
        LinkParams {
            beta: config.physics.beta,
            hyb_cutoff: config.numerics.hyb_cutoff,
            green_frequencies: config.numerics.green_frequencies,
        },
        n_site,
        &config.link,
        &entries,
    )?;
    let params = ChainParams {
        beta: config.physics.beta,
        n_site,
        prob_flip: config.numerics.prob_flip,
        max_order: config.numerics.max_order,
        chi_frequencies: config.numerics.chi_frequencies,
        seed: config.numerics.seed,
        rank,
        trace: TraceParams {
            beta: config.physics.beta,
            mu: config.physics.mu,
            u: config.physics.u,
            chi_frequencies: config.numerics.chi_frequencies,
        },
    };
    MarkovChain::new(params, link, &config.output.directory)
}

fn is_due(step: usize, interval: usize) -> bool {
    interval > 0 && step % interval == 0
}

/// Runs thermalization and measurement for worker `rank`, then persists the
/// measurements, the checkpoint and the manifest.
pub fn run_worker(config: &RunConfig, rank: u64) -> Result<WorkerReport, QmcError> {
    let mut chain = build_chain(config, rank)?;
    let schedule = &config.schedule;
    let root = &config.output.directory;

    info!(rank, n_site = chain.n_site(), updates = schedule.thermalization, "thermalizing");
    for step in 1..=schedule.thermalization {
        chain.do_update();
        if is_due(step, schedule.clean_interval) {
            chain.clean_update();
        }
    }

    info!(rank, updates = schedule.updates, "measuring");
    let mut sink = Measurements::new();
    let mut pending = 0;
    let mut stores = 0;
    for step in 1..=schedule.updates {
        chain.do_update();
        if is_due(step, schedule.clean_interval) {
            chain.clean_update();
        }
        if is_due(step, schedule.measure_interval) {
            chain.measure();
            pending += 1;
            if pending == schedule.store_every {
                chain.store(&mut sink, pending);
                stores += 1;
                pending = 0;
            }
        }
    }
    if pending > 0 {
        chain.store(&mut sink, pending);
        stores += 1;
    }

    let measurements = measurements_path(root, rank);
    sink.write(&measurements)?;

    let restore = chain.restore_outcome().clone();
    let checkpoint = checkpoint_path(root, rank);
    let acceptance = chain.finish(&checkpoint)?;

    let manifest = WorkerManifest {
        schema: SchemaVersion::CURRENT,
        config: config.clone(),
        provenance: provenance(config, rank)?,
        restore: restore.clone(),
        measurements_file: measurements.clone(),
        checkpoint_file: checkpoint.clone(),
        acceptance: acceptance.clone(),
    };
    let manifest_file = manifest_path(root, rank);
    manifest.write(&manifest_file)?;
    info!(rank, stores, path = %measurements.display(), "worker finished");

    Ok(WorkerReport {
        measurements_path: measurements,
        checkpoint_path: checkpoint,
        manifest_path: manifest_file,
        stores,
        restore,
        acceptance,
    })
}
