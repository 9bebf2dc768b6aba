use serde::{Deserialize, Serialize};

/// Per-site scalar observables aggregated across sites at every store.
///
/// Traces add their normalized per-site values; the chain divides the
/// densities by the number of sites before emitting them. `k` stays a total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalObservables {
    /// Total perturbation order.
    pub k: f64,
    /// Occupation per site.
    pub n: f64,
    /// Double occupancy per site.
    pub d: f64,
    /// Magnetization per site.
    pub sz: f64,
    /// Local spin susceptibility per bosonic Matsubara frequency.
    pub chi: Vec<f64>,
}

impl LocalObservables {
    /// Zeroed accumulator measuring `chi_frequencies` bosonic frequencies.
    pub fn new(chi_frequencies: usize) -> Self {
        Self {
            k: 0.0,
            n: 0.0,
            d: 0.0,
            sz: 0.0,
            chi: vec![0.0; chi_frequencies],
        }
    }

    /// Resets every entry to zero, keeping the frequency count.
    pub fn reset(&mut self) {
        self.k = 0.0;
        self.n = 0.0;
        self.d = 0.0;
        self.sz = 0.0;
        self.chi.iter_mut().for_each(|value| *value = 0.0);
    }

    /// Converts site sums into per-site means (`k` is left untouched).
    pub fn average_over_sites(&mut self, n_site: usize) {
        let norm = n_site.max(1) as f64;
        self.n /= norm;
        self.d /= norm;
        self.sz /= norm;
        self.chi.iter_mut().for_each(|value| *value /= norm);
    }
}
