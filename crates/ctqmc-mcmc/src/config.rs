use std::fs;
use std::path::{Path, PathBuf};

use ctqmc_core::errors::ErrorInfo;
use ctqmc_core::QmcError;
use serde::{Deserialize, Serialize};

/// YAML-configurable parameters of one worker run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Impurity parameters.
    pub physics: PhysicsConfig,
    /// Sampling and measurement resolution.
    #[serde(default)]
    pub numerics: NumericsConfig,
    /// Update and measurement cadence.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Output directory configuration.
    #[serde(default)]
    pub output: OutputConfig,
    /// Component table over `2 * n_site` flavors (`"empty"` for no coupling).
    pub link: Vec<Vec<String>>,
    /// JSON file with the hybridization entries named in `link`.
    pub hybridization_file: PathBuf,
}

/// Physical parameters of the density-density impurity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Inverse temperature.
    pub beta: f64,
    /// Chemical potential.
    #[serde(default)]
    pub mu: f64,
    /// On-site Hubbard repulsion.
    #[serde(default)]
    pub u: f64,
}

/// Numerical knobs of the sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericsConfig {
    /// Master seed shared by all ranks.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Probability of attempting a global flip per update.
    #[serde(default = "default_prob_flip")]
    pub prob_flip: f64,
    /// Number of bins of the perturbation-order histogram.
    #[serde(default = "default_max_order")]
    pub max_order: usize,
    /// Bosonic frequencies measured for the spin susceptibility.
    #[serde(default = "default_chi_frequencies")]
    pub chi_frequencies: usize,
    /// Fermionic frequencies measured for the Green's function.
    #[serde(default = "default_green_frequencies")]
    pub green_frequencies: usize,
    /// Energy cutoff of the hybridization time grid.
    #[serde(default = "default_hyb_cutoff")]
    pub hyb_cutoff: f64,
}

fn default_seed() -> u64 {
    41
}

fn default_prob_flip() -> f64 {
    0.05
}

fn default_max_order() -> usize {
    200
}

fn default_chi_frequencies() -> usize {
    1
}

fn default_green_frequencies() -> usize {
    50
}

fn default_hyb_cutoff() -> f64 {
    10.0
}

impl Default for NumericsConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            prob_flip: default_prob_flip(),
            max_order: default_max_order(),
            chi_frequencies: default_chi_frequencies(),
            green_frequencies: default_green_frequencies(),
            hyb_cutoff: default_hyb_cutoff(),
        }
    }
}

/// Update counts and measurement cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Updates performed before any measurement.
    #[serde(default = "default_thermalization")]
    pub thermalization: usize,
    /// Updates performed during the measurement phase.
    #[serde(default = "default_updates")]
    pub updates: usize,
    /// Updates between two measurements.
    #[serde(default = "default_measure_interval")]
    pub measure_interval: usize,
    /// Measurements accumulated before each store.
    #[serde(default = "default_store_every")]
    pub store_every: usize,
    /// Updates between two full bath rebuilds (0 disables them).
    #[serde(default = "default_clean_interval")]
    pub clean_interval: usize,
}

fn default_thermalization() -> usize {
    10_000
}

fn default_updates() -> usize {
    100_000
}

fn default_measure_interval() -> usize {
    10
}

fn default_store_every() -> usize {
    1_000
}

fn default_clean_interval() -> usize {
    1_000
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            thermalization: default_thermalization(),
            updates: default_updates(),
            measure_interval: default_measure_interval(),
            store_every: default_store_every(),
            clean_interval: default_clean_interval(),
        }
    }
}

/// Output directory layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving checkpoints, measurements and manifests.
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("runs")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn invalid(code: &str, message: &str, key: &str, value: impl ToString) -> QmcError {
    QmcError::Config(ErrorInfo::new(code, message).with_context(key, value.to_string()))
}

impl RunConfig {
    /// Parses a YAML document and validates it.
    pub fn from_yaml(text: &str) -> Result<Self, QmcError> {
        let config: RunConfig = serde_yaml::from_str(text)
            .map_err(|err| QmcError::Config(ErrorInfo::new("config-parse", err.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML file; a relative `hybridization_file` and output
    /// directory are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, QmcError> {
        let text = fs::read_to_string(path).map_err(|err| QmcError::io("config-read", path, err))?;
        let mut config = Self::from_yaml(&text).map_err(|err| match err {
            QmcError::Config(info) => {
                QmcError::Config(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })?;
        if let Some(base) = path.parent() {
            if config.hybridization_file.is_relative() {
                config.hybridization_file = base.join(&config.hybridization_file);
            }
            if config.output.directory.is_relative() {
                config.output.directory = base.join(&config.output.directory);
            }
        }
        Ok(config)
    }

    /// Number of sites implied by the component table.
    pub fn n_site(&self) -> usize {
        self.link.len() / 2
    }

    /// Checks ranges and the shape of the component table.
    pub fn validate(&self) -> Result<(), QmcError> {
        if !(self.physics.beta > 0.0 && self.physics.beta.is_finite()) {
            return Err(invalid("config-beta", "beta must be positive", "beta", self.physics.beta));
        }
        let numerics = &self.numerics;
        if !(0.0..=1.0).contains(&numerics.prob_flip) {
            return Err(invalid(
                "config-prob-flip",
                "prob_flip must lie in [0, 1]",
                "prob_flip",
                numerics.prob_flip,
            ));
        }
        if numerics.max_order == 0 {
            return Err(invalid("config-max-order", "max_order must be positive", "max_order", 0));
        }
        if numerics.chi_frequencies == 0 {
            return Err(invalid(
                "config-chi-frequencies",
                "at least the zero bosonic frequency must be measured",
                "chi_frequencies",
                0,
            ));
        }
        if !(numerics.hyb_cutoff > 0.0) {
            return Err(invalid(
                "config-hyb-cutoff",
                "hyb_cutoff must be positive",
                "hyb_cutoff",
                numerics.hyb_cutoff,
            ));
        }
        if self.schedule.measure_interval == 0 || self.schedule.store_every == 0 {
            return Err(QmcError::Config(
                ErrorInfo::new("config-schedule", "measure_interval and store_every must be positive")
                    .with_context("measure_interval", self.schedule.measure_interval.to_string())
                    .with_context("store_every", self.schedule.store_every.to_string()),
            ));
        }
        let flavors = self.link.len();
        if flavors == 0 || flavors % 2 != 0 || self.link.iter().any(|row| row.len() != flavors) {
            return Err(QmcError::Config(
                ErrorInfo::new("config-link", "link must be a square table over 2 * n_site flavors")
                    .with_context("rows", flavors.to_string())
                    .with_hint("flavor index is spin * n_site + site"),
            ));
        }
        Ok(())
    }
}
