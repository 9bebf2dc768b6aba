use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use ctqmc_mcmc::merge_files;
use tracing::info;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Measurement files written by `ctqmc-sim run`, one per rank.
    #[arg(long = "inputs", value_name = "PATH", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    /// Destination of the merged estimates.
    #[arg(long)]
    pub out: PathBuf,
}

pub fn run(args: &MergeArgs) -> Result<(), Box<dyn Error>> {
    let merged = merge_files(args.inputs.as_slice())?;
    if let Some(parent) = args.out.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.out, serde_json::to_string_pretty(&merged)?)?;
    info!(ranks = merged.ranks, sign = merged.sign, path = %args.out.display(), "merged measurements");
    Ok(())
}
