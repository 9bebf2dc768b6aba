#![deny(missing_docs)]

//! Core traits and data types for the segment-picture CT-QMC engine.
//!
//! The Markov chain in `ctqmc-mcmc` is generic over three collaborators whose
//! contracts live here: a [`LocalTrace`] per site, one [`Bath`] holding the
//! hybridization-induced coupling between all operators, and a [`Link`]
//! resolving which hybridization component couples two flavors.

use std::fmt::Debug;

use num_complex::Complex64;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub mod errors;
pub mod json;
pub mod measurements;
mod observables;
pub mod operator;
pub mod provenance;
pub mod rng;

pub use errors::{ErrorInfo, QmcError};
pub use json::{read_json, write_json};
pub use measurements::{Measurements, Sample};
pub use observables::LocalObservables;
pub use operator::{FlavoredOperator, Operator, OperatorId, OperatorKind, Spin};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, RngHandle};

/// Per-site local trace owning the operator sequences of both spin channels.
///
/// Proposals are two-phase: `insert`/`erase` stage a pending change and return
/// its log weight ratio (proposal probabilities included); the chain then
/// commits with `accept_*` or rolls back with `reject_*`. Exactly one of the
/// two must follow every proposal.
pub trait LocalTrace: Sized {
    /// Numerical parameters shared by all sites.
    type Params;
    /// Serialized per-site configuration stored in checkpoints.
    type Snapshot: Serialize + DeserializeOwned + Clone + Debug;

    /// Creates a trace with empty channels.
    fn new(params: &Self::Params, site: usize) -> Self;

    /// Rebuilds a trace from a checkpoint block.
    fn restore(
        params: &Self::Params,
        site: usize,
        snapshot: Self::Snapshot,
    ) -> Result<Self, QmcError>;

    /// Stages the insertion of an operator pair; returns the log weight ratio.
    fn insert(&mut self, spin: Spin, rng: &mut RngHandle) -> f64;

    /// Stages the removal of an operator pair; returns the log weight ratio.
    fn erase(&mut self, spin: Spin, rng: &mut RngHandle) -> f64;

    /// Commits the pending insertion; returns the trace sign multiplier.
    fn accept_insert(&mut self, spin: Spin) -> i32;

    /// Drops the pending insertion.
    fn reject_insert(&mut self, spin: Spin);

    /// Commits the pending removal; returns the trace sign multiplier.
    fn accept_erase(&mut self, spin: Spin) -> i32;

    /// Drops the pending removal.
    fn reject_erase(&mut self, spin: Spin);

    /// Exchanges the two spin channels.
    fn flip(&mut self);

    /// Current sign of the local trace, always +1 or -1.
    fn sign(&self) -> i32;

    /// Time-ordered operators of one channel.
    fn operators(&self, spin: Spin) -> &[Operator];

    /// Annihilator of the pending proposal, if one could be formed.
    fn op(&self) -> Option<&Operator>;

    /// Creator of the pending proposal, if one could be formed.
    fn op_dagg(&self) -> Option<&Operator>;

    /// Accumulates site observables with `sign`; returns the spin response per
    /// bosonic frequency in the chain's internal convention.
    fn measure(&mut self, sign: i32) -> Vec<Complex64>;

    /// Exact same-site susceptibility accumulated since the last store, in
    /// the same convention as the chain's cross-site accumulator after its
    /// zero-frequency `1/beta` correction.
    fn chi(&self) -> Vec<f64>;

    /// Flushes the site series into `sink`, adds the normalized values to
    /// `acc` and resets the site accumulators.
    fn store(
        &mut self,
        sink: &mut Measurements,
        site: usize,
        acc: &mut LocalObservables,
        count: usize,
    );

    /// Serializes the current configuration.
    fn snapshot(&self) -> Self::Snapshot;
}

/// One element of the inverse hybridization matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BathEntry {
    /// Row operator.
    pub annihilator: FlavoredOperator,
    /// Column operator.
    pub creator: FlavoredOperator,
    /// `M[creator, annihilator]` of the inverse matrix.
    pub inverse: f64,
}

/// Global matrix subsystem coupling every operator through the bath.
///
/// Operators are referenced by flavor, time and identity; the bath keeps its
/// own bookkeeping in lockstep with the traces. `Default` yields an empty
/// bath with determinant 1.
pub trait Bath: Default {
    /// Registers an annihilator without computing a weight.
    fn add(&mut self, site: usize, spin: Spin, op: &Operator);

    /// Registers a creator without computing a weight.
    fn add_dagg(&mut self, site: usize, spin: Spin, op: &Operator);

    /// Stages the insertion of a pair; returns `ln |det ratio|`.
    fn insert<L: Link>(
        &mut self,
        site: usize,
        spin: Spin,
        annihilator: &Operator,
        creator: &Operator,
        link: &L,
    ) -> f64;

    /// Stages the removal of the pair at the given times; returns `ln |det ratio|`.
    fn erase(
        &mut self,
        site: usize,
        spin: Spin,
        annihilator_time: f64,
        creator_time: f64,
    ) -> f64;

    /// Commits the pending insertion; returns the determinant sign multiplier.
    fn accept_insert(&mut self) -> i32;

    /// Drops the pending insertion.
    fn reject_insert(&mut self);

    /// Commits the pending removal; returns the determinant sign multiplier.
    fn accept_erase(&mut self) -> i32;

    /// Drops the pending removal.
    fn reject_erase(&mut self);

    /// Recomputes the matrix from scratch; returns the determinant sign.
    fn rebuild<L: Link>(&mut self, link: &L) -> i32;

    /// Determinant of the hybridization matrix.
    fn det(&self) -> f64;

    /// Iterates over every element of the inverse matrix.
    fn entries(&self) -> Box<dyn Iterator<Item = BathEntry> + '_>;

    /// Every registered operator, annihilators first, in canonical order.
    fn registered(&self) -> Vec<FlavoredOperator>;
}

/// Resolves hybridization components between flavors and measures the
/// Green's function from the bath's inverse matrix.
pub trait Link {
    /// Hybridization `Delta(tau_a - tau_c)` between an annihilator and a
    /// creator, antiperiodically extended to negative time differences.
    fn hybridization(&self, annihilator: &FlavoredOperator, creator: &FlavoredOperator) -> f64;

    /// Accumulates the Green's function estimator for one sample.
    fn measure(&mut self, sign: i32, entries: &mut dyn Iterator<Item = BathEntry>);

    /// Normalizes by `count`, flushes into `sink` and resets.
    fn store(&mut self, sink: &mut Measurements, count: usize);
}
