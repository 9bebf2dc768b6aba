//! Append-only measurement sink shared by the chain and its collaborators.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::QmcError;
use crate::json::{read_json, write_json};

/// One flushed sample of a named series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    /// A single number (mean sign, density, ...).
    Scalar(f64),
    /// A vector or histogram.
    Vector(Vec<f64>),
}

impl Sample {
    /// Returns the scalar value, if this is a scalar sample.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Sample::Scalar(value) => Some(*value),
            Sample::Vector(_) => None,
        }
    }

    /// Returns the vector payload, if this is a vector sample.
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Sample::Scalar(_) => None,
            Sample::Vector(values) => Some(values),
        }
    }
}

/// Named series of samples, kept in the order they were first emitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Measurements {
    series: IndexMap<String, Vec<Sample>>,
}

impl Measurements {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a scalar sample to `name`.
    pub fn push_scalar(&mut self, name: impl Into<String>, value: f64) {
        self.series
            .entry(name.into())
            .or_default()
            .push(Sample::Scalar(value));
    }

    /// Appends a vector sample to `name`.
    pub fn push_vector(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series
            .entry(name.into())
            .or_default()
            .push(Sample::Vector(values));
    }

    /// Returns every sample recorded under `name`.
    pub fn series(&self, name: &str) -> Option<&[Sample]> {
        self.series.get(name).map(Vec::as_slice)
    }

    /// Returns the most recent sample recorded under `name`.
    pub fn last(&self, name: &str) -> Option<&Sample> {
        self.series.get(name).and_then(|samples| samples.last())
    }

    /// Iterates over series names in emission order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Number of distinct series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Mean over the scalar samples of `name`.
    pub fn mean(&self, name: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .series(name)?
            .iter()
            .filter_map(Sample::as_scalar)
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Element-wise mean over the vector samples of `name`.
    ///
    /// Samples shorter than the first one are ignored.
    pub fn mean_vector(&self, name: &str) -> Option<Vec<f64>> {
        let vectors: Vec<&[f64]> = self
            .series(name)?
            .iter()
            .filter_map(Sample::as_vector)
            .collect();
        let width = vectors.first()?.len();
        let mut sum = vec![0.0; width];
        let mut count = 0usize;
        for vector in vectors.iter().filter(|v| v.len() == width) {
            for (acc, value) in sum.iter_mut().zip(vector.iter()) {
                *acc += value;
            }
            count += 1;
        }
        sum.iter_mut().for_each(|value| *value /= count as f64);
        Some(sum)
    }

    /// Appends every series of `other` after the samples already present.
    pub fn extend(&mut self, other: Measurements) {
        for (name, samples) in other.series {
            self.series.entry(name).or_default().extend(samples);
        }
    }

    /// Loads a sink previously written with [`Measurements::write`].
    pub fn load(path: &Path) -> Result<Self, QmcError> {
        read_json(path, "measurements")
    }

    /// Writes the sink as pretty JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), QmcError> {
        write_json(path, self, "measurements")
    }
}
