//! The single random stream of a worker.

use std::hash::Hasher;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use siphasher::sip::SipHasher13;

/// Random stream consumed by the chain and its collaborators.
///
/// Every draw of a worker goes through one handle in a fixed order, so a run
/// is reproducible from its seed, rank and step count.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
}

impl RngHandle {
    /// Stream seeded directly with `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Stream of worker `rank` in a run with master seed `seed`.
    pub fn for_worker(seed: u64, rank: u64) -> Self {
        Self::from_seed(derive_substream_seed(seed, rank))
    }

    /// Uniform deviate in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Index in `0..bound` obtained by scaling one uniform deviate; 0 when
    /// `bound` is 0 or 1.
    pub fn index(&mut self, bound: usize) -> usize {
        let draw = (self.uniform() * bound as f64) as usize;
        draw.min(bound.saturating_sub(1))
    }
}

/// SipHash-1-3 with zero keys over `(master_seed, substream)`; stable across
/// platforms and releases.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}
