use serde::{Deserialize, Serialize};

/// Local update chosen for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalMove {
    /// Propose a new operator pair.
    Insert,
    /// Propose removing an operator pair.
    Erase,
    /// Nothing to do this step.
    Skip,
}

impl LocalMove {
    /// Decision table for a channel given a coin drawn uniformly on `[0, 1)`.
    ///
    /// | channel   | coin < 0.5 | coin >= 0.5 |
    /// |-----------|------------|-------------|
    /// | empty     | insert     | skip        |
    /// | non-empty | insert     | erase       |
    pub fn choose(channel_empty: bool, coin: f64) -> Self {
        match (channel_empty, coin < 0.5) {
            (_, true) => LocalMove::Insert,
            (true, false) => LocalMove::Skip,
            (false, false) => LocalMove::Erase,
        }
    }
}

/// Global rearrangement of the traces; applying it twice is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlipProposal {
    /// Exchange the spin channels of one site.
    Spin {
        /// Site whose channels are swapped.
        site: usize,
    },
    /// Exchange the traces of two sites; equal sites leave them unchanged.
    Sites {
        /// First site.
        a: usize,
        /// Second site.
        b: usize,
    },
}

impl FlipProposal {
    /// Site flip between `site` and the drawn partner `other`, drawn from
    /// `0..n_site - 1`. A partner equal to `site` is remapped to the last
    /// site. With a single site this is a self swap, so the spin-flip rate
    /// stays one half of all flips.
    pub fn sites(site: usize, other: usize, n_site: usize) -> Self {
        if n_site < 2 {
            return FlipProposal::Sites { a: site, b: site };
        }
        let other = if other == site { n_site - 1 } else { other };
        FlipProposal::Sites { a: site, b: other }
    }

    /// Applies the rearrangement to the trace array.
    pub fn apply<T: ctqmc_core::LocalTrace>(&self, traces: &mut [T]) {
        match *self {
            FlipProposal::Spin { site } => traces[site].flip(),
            FlipProposal::Sites { a, b } => traces.swap(a, b),
        }
    }
}
