//! Hybridization functions: Matsubara input, imaginary-time tables.

use std::f64::consts::PI;
use std::path::Path;

use ctqmc_core::errors::ErrorInfo;
use ctqmc_core::{read_json, QmcError};
use indexmap::IndexMap;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// One hybridization component on fermionic Matsubara frequencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybEntry {
    /// Inverse temperature the data was computed at.
    pub beta: f64,
    /// Coefficient of the `1/(i w)` tail.
    #[serde(rename = "First Moment")]
    pub first_moment: f64,
    /// Coefficient of the `1/(i w)^2` tail.
    #[serde(rename = "Second Moment")]
    pub second_moment: f64,
    /// Real parts, one per non-negative frequency.
    pub real: Vec<f64>,
    /// Imaginary parts, one per non-negative frequency.
    pub imag: Vec<f64>,
}

impl HybEntry {
    /// Linearly interpolates the data onto the Matsubara grid of `beta_out`.
    ///
    /// Output frequencies run up to the last input frequency.
    pub fn resample(&self, beta_out: f64) -> Result<Vec<Complex64>, QmcError> {
        if self.real.len() != self.imag.len() {
            return Err(QmcError::Config(
                ErrorInfo::new("hyb-length-mismatch", "real and imaginary arrays differ in length")
                    .with_context("real", self.real.len().to_string())
                    .with_context("imag", self.imag.len().to_string()),
            ));
        }
        let beta_in = self.beta;
        let mut out = Vec::new();
        let mut n = 0usize;
        for m in 1..self.real.len() {
            let z0 = PI * (2 * m - 1) as f64 / beta_in;
            let z1 = PI * (2 * m + 1) as f64 / beta_in;
            let h0 = Complex64::new(self.real[m - 1], self.imag[m - 1]);
            let h1 = Complex64::new(self.real[m], self.imag[m]);
            while (2 * n + 1) as f64 / beta_out <= (2 * m + 1) as f64 / beta_in {
                let w = PI * (2 * n + 1) as f64 / beta_out;
                out.push(h0 + (h1 - h0) * ((w - z0) / (z1 - z0)));
                n += 1;
            }
        }
        Ok(out)
    }
}

/// Reads a JSON object mapping component names to [`HybEntry`] records.
pub fn load_hybridization(path: &Path) -> Result<IndexMap<String, HybEntry>, QmcError> {
    read_json(path, "hyb")
}

/// Hybridization function tabulated on an equidistant imaginary-time grid.
#[derive(Debug, Clone)]
pub struct HybFunction {
    beta: f64,
    table: Vec<f64>,
}

impl HybFunction {
    /// Fourier transforms `entry` to `[0, beta]` with `cutoff^2 * beta + 1`
    /// intervals, treating the first two tail moments analytically.
    pub fn new(entry: &HybEntry, beta: f64, cutoff: f64) -> Result<Self, QmcError> {
        if !(beta > 0.0) || !(cutoff > 0.0) {
            return Err(QmcError::Config(
                ErrorInfo::new("hyb-grid", "beta and the hybridization cutoff must be positive")
                    .with_context("beta", beta.to_string())
                    .with_context("cutoff", cutoff.to_string()),
            ));
        }
        let intervals = (cutoff * cutoff * beta) as usize + 1;
        let first = entry.first_moment;
        let second = entry.second_moment;

        let mut table: Vec<f64> = (0..=intervals)
            .map(|i| {
                let time = beta * i as f64 / intervals as f64;
                -first / 2.0 + second * (time - beta / 2.0) / 2.0
            })
            .collect();

        for (m, value) in entry.resample(beta)?.into_iter().enumerate() {
            let z = Complex64::new(0.0, PI * (2 * m + 1) as f64 / beta);
            let residual = value - first / z - second / (z * z);
            for (i, slot) in table.iter_mut().enumerate() {
                let arg = PI * (2 * m + 1) as f64 * i as f64 / intervals as f64;
                *slot += 2.0 / beta * (residual.re * arg.cos() + residual.im * arg.sin());
            }
        }

        Ok(Self { beta, table })
    }

    /// `Delta(tau)` for `tau` in `[0, beta]`, linearly interpolated.
    pub fn get(&self, time: f64) -> f64 {
        let intervals = self.table.len() - 1;
        let position = (time / self.beta * intervals as f64).clamp(0.0, intervals as f64);
        let lower = (position as usize).min(intervals - 1);
        let frac = position - lower as f64;
        (1.0 - frac) * self.table[lower] + frac * self.table[lower + 1]
    }

    /// `Delta(tau)` on `(-beta, beta)` with the fermionic antiperiodic extension.
    pub fn antiperiodic(&self, time: f64) -> f64 {
        if time < 0.0 {
            -self.get(time + self.beta)
        } else {
            self.get(time)
        }
    }

    /// Number of grid points.
    pub fn points(&self) -> usize {
        self.table.len()
    }
}
