use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use ctqmc_core::{OperatorKind, Spin};
use ctqmc_mcmc::{Checkpoint, CHECKPOINT_KEY};
use ctqmc_trace::{ChannelRecord, TraceSnapshot};
use serde::Serialize;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Checkpoint written by `ctqmc-sim run`.
    #[arg(long)]
    pub checkpoint: PathBuf,
}

#[derive(Debug, Serialize)]
struct ChannelSummary {
    site: usize,
    spin: Spin,
    operators: usize,
    occupation: f64,
}

#[derive(Debug, Serialize)]
struct CheckpointSummary {
    beta: f64,
    n_site: usize,
    key_valid: bool,
    operators: usize,
    channels: Vec<ChannelSummary>,
}

/// Fraction of `[0, beta)` covered by segments of an alternating channel.
fn occupation(records: &[ChannelRecord], full: bool, beta: f64) -> f64 {
    let Some(first) = records.first() else {
        return if full { 1.0 } else { 0.0 };
    };
    let mut covered = 0.0;
    for (idx, record) in records.iter().enumerate() {
        if record.kind != first.kind {
            continue;
        }
        let end = records.get(idx + 1).map_or(first.time + beta, |next| next.time);
        covered += end - record.time;
    }
    let covered = covered / beta;
    match first.kind {
        OperatorKind::Creation => covered,
        OperatorKind::Annihilation => 1.0 - covered,
    }
}

pub fn run(args: &InspectArgs) -> Result<(), Box<dyn Error>> {
    let checkpoint: Checkpoint<TraceSnapshot> = Checkpoint::read(&args.checkpoint)?;
    let mut channels = Vec::new();
    for (site, snapshot) in checkpoint.sites.iter().enumerate() {
        for spin in Spin::ALL {
            let records = snapshot.channel(spin);
            channels.push(ChannelSummary {
                site,
                spin,
                operators: records.len(),
                occupation: occupation(records, snapshot.is_full(spin), checkpoint.beta),
            });
        }
    }
    let summary = CheckpointSummary {
        beta: checkpoint.beta,
        n_site: checkpoint.n_site,
        key_valid: checkpoint.key == CHECKPOINT_KEY,
        operators: channels.iter().map(|channel| channel.operators).sum(),
        channels,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
