#![deny(missing_docs)]

//! Markov-chain engine of the segment-picture CT-QMC solver.
//!
//! [`MarkovChain`] drives the local insert/erase moves and the global flip
//! moves, tracks the sample sign, accumulates observables between stores and
//! persists its configuration for the next run. [`run_worker`] wires the
//! chain to the reference trace, bath and link for one worker process.

/// Running sums flushed at every store.
pub mod accumulators;
/// The Markov chain and its acceptance statistics.
pub mod chain;
/// Checkpoint document and the restore protocol.
pub mod checkpoint;
/// YAML configuration schema and defaults.
pub mod config;
/// Worker loop over the reference collaborators.
pub mod driver;
/// Worker manifest serialization helpers.
pub mod manifest;
/// Sign-weighted merge of measurement files across ranks.
pub mod merge;
/// Move selection and flip transactions.
pub mod moves;

pub use accumulators::ChainAccumulators;
pub use chain::{AcceptanceSummary, ChainParams, ChannelAcceptance, MarkovChain};
pub use checkpoint::{checkpoint_path, Checkpoint, FreshReason, RestoreOutcome, CHECKPOINT_KEY};
pub use config::{NumericsConfig, OutputConfig, PhysicsConfig, RunConfig, ScheduleConfig};
pub use driver::{build_chain, measurements_path, run_worker, SegmentChain, WorkerReport};
pub use manifest::WorkerManifest;
pub use merge::{merge_files, merge_measurements, MergedRun};
pub use moves::{FlipProposal, LocalMove};
