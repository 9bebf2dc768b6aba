use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    inspect::{self, InspectArgs},
    merge::{self, MergeArgs},
    run::{self, RunArgs},
};
use tracing::Level;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "ctqmc-sim", about = "Segment CT-QMC impurity sampler CLI")]
struct Cli {
    /// Maximum log level written to stderr.
    #[arg(long, global = true, default_value_t = Level::INFO)]
    log_level: Level,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one worker from a YAML configuration.
    Run(RunArgs),
    /// Summarize a checkpoint file.
    Inspect(InspectArgs),
    /// Merge measurement files of several ranks into sign-corrected estimates.
    Merge(MergeArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    match cli.command {
        Command::Run(args) => run::run(&args),
        Command::Inspect(args) => inspect::run(&args),
        Command::Merge(args) => merge::run(&args),
    }
}
