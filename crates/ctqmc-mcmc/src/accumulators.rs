use std::f64::consts::PI;

use ctqmc_core::LocalObservables;
use num_complex::Complex64;

/// Running sums owned by the chain and flushed at every store.
///
/// The cross-site susceptibility uses the flat layout
/// `(i * n_site + j) * n_chi + n`.
#[derive(Debug, Clone)]
pub struct ChainAccumulators {
    n_site: usize,
    chi_frequencies: usize,
    /// Sum of sample signs.
    pub sign: f64,
    /// Signed perturbation-order histogram.
    pub order_histogram: Vec<f64>,
    /// Signed cross-site spin response products.
    pub chi_ij: Vec<Complex64>,
    /// Per-site scalar observables summed over sites.
    pub local: LocalObservables,
}

impl ChainAccumulators {
    /// Zeroed accumulators.
    pub fn new(n_site: usize, max_order: usize, chi_frequencies: usize) -> Self {
        let chi_frequencies = chi_frequencies.max(1);
        Self {
            n_site,
            chi_frequencies,
            sign: 0.0,
            order_histogram: vec![0.0; max_order.max(1)],
            chi_ij: vec![Complex64::new(0.0, 0.0); n_site * n_site * chi_frequencies],
            local: LocalObservables::new(chi_frequencies),
        }
    }

    /// Number of bosonic frequencies per site pair.
    pub fn chi_frequencies(&self) -> usize {
        self.chi_frequencies
    }

    /// Adds `sign` to the bin of order `k`; orders past the end land in the last bin.
    pub fn record_order(&mut self, k: usize, sign: f64) {
        let last = self.order_histogram.len() - 1;
        self.order_histogram[k.min(last)] += sign;
    }

    /// Accumulates `sign * chi_i[n] * conj(chi_j[n])` for every ordered site pair.
    pub fn record_responses(&mut self, responses: &[Vec<Complex64>], sign: f64) {
        let n_chi = self.chi_frequencies;
        debug_assert_eq!(responses.len(), self.n_site);
        debug_assert!(responses.iter().all(|chi| chi.len() == n_chi));
        for (i, chi_i) in responses.iter().enumerate() {
            for (j, chi_j) in responses.iter().enumerate() {
                let offset = (i * self.n_site + j) * n_chi;
                for (n, (a, b)) in chi_i.iter().zip(chi_j.iter()).take(n_chi).enumerate() {
                    self.chi_ij[offset + n] += *a * b.conj() * sign;
                }
            }
        }
    }

    /// Physical cross-site susceptibility.
    ///
    /// Zero-frequency entries are divided by `beta`, diagonal blocks are
    /// replaced by `diagonal[i]`, finite frequencies are scaled by
    /// `beta / (2 n pi)^2` and everything is divided by `count`.
    pub fn normalized_chi(&self, beta: f64, diagonal: &[Vec<f64>], count: usize) -> Vec<f64> {
        let n_chi = self.chi_frequencies;
        let mut chi: Vec<f64> = self
            .chi_ij
            .iter()
            .enumerate()
            .map(|(idx, value)| if idx % n_chi == 0 { value.re / beta } else { value.re })
            .collect();

        for (i, exact) in diagonal.iter().enumerate().take(self.n_site) {
            let offset = (i * self.n_site + i) * n_chi;
            for (n, value) in exact.iter().take(n_chi).enumerate() {
                chi[offset + n] = *value;
            }
        }

        let norm = count as f64;
        for (idx, value) in chi.iter_mut().enumerate() {
            let n = idx % n_chi;
            if n > 0 {
                let omega = 2.0 * n as f64 * PI;
                *value *= beta / (omega * omega);
            }
            *value /= norm;
        }
        chi
    }

    /// Clears every running sum.
    pub fn reset(&mut self) {
        self.sign = 0.0;
        self.order_histogram.iter_mut().for_each(|value| *value = 0.0);
        self.chi_ij
            .iter_mut()
            .for_each(|value| *value = Complex64::new(0.0, 0.0));
        self.local.reset();
    }
}
