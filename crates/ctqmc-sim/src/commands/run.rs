use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use ctqmc_mcmc::{run_worker, RunConfig};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML configuration describing the impurity and the schedule.
    #[arg(long)]
    pub config: PathBuf,
    /// Worker rank; selects the RNG stream and the output file names.
    #[arg(long, default_value_t = 0)]
    pub rank: u64,
    /// Overrides the output directory of the configuration.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Overrides the master seed of the configuration.
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut config = RunConfig::load(&args.config)?;
    if let Some(out) = &args.out {
        config.output.directory = out.clone();
    }
    if let Some(seed) = args.seed {
        config.numerics.seed = seed;
    }
    let report = run_worker(&config, args.rank)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
