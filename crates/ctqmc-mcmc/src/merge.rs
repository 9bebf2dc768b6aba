use std::path::Path;

use ctqmc_core::errors::ErrorInfo;
use ctqmc_core::{Measurements, QmcError, Sample};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cross-rank estimate of every observable of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRun {
    /// Number of measurement files merged.
    pub ranks: usize,
    /// Mean sample sign over all ranks.
    pub sign: f64,
    /// One sample per series, divided by `sign` (except `Sign` itself).
    pub observables: Measurements,
}

fn rank_mean(sink: &Measurements, name: &str) -> Option<Sample> {
    match sink.series(name)?.first()? {
        Sample::Scalar(_) => sink.mean(name).map(Sample::Scalar),
        Sample::Vector(_) => sink.mean_vector(name).map(Sample::Vector),
    }
}

fn accumulate(total: &mut Option<Sample>, value: Sample) {
    match (total.as_mut(), value) {
        (None, value) => *total = Some(value),
        (Some(Sample::Scalar(acc)), Sample::Scalar(value)) => *acc += value,
        (Some(Sample::Vector(acc)), Sample::Vector(values)) if acc.len() == values.len() => {
            acc.iter_mut().zip(values).for_each(|(a, v)| *a += v);
        }
        (Some(_), _) => warn!("series changes shape across ranks; sample skipped"),
    }
}

/// Averages the per-rank means of every series and divides by the mean sign.
///
/// Series stored by the chain carry the sample sign, so the ratio of the two
/// averages is the physical estimate.
pub fn merge_measurements(sinks: &[Measurements]) -> Result<MergedRun, QmcError> {
    if sinks.is_empty() {
        return Err(QmcError::Config(ErrorInfo::new(
            "merge-empty",
            "no measurement files to merge",
        )));
    }

    let mut names: Vec<&str> = Vec::new();
    for sink in sinks {
        for name in sink.names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    let mut sign_total = 0.0;
    for (rank, sink) in sinks.iter().enumerate() {
        let sign = sink.mean("Sign").ok_or_else(|| {
            QmcError::Config(
                ErrorInfo::new("merge-missing-sign", "measurement file has no Sign series")
                    .with_context("input", rank.to_string()),
            )
        })?;
        sign_total += sign;
    }
    let ranks = sinks.len() as f64;
    let sign = sign_total / ranks;
    if sign == 0.0 {
        return Err(QmcError::Config(
            ErrorInfo::new("merge-zero-sign", "mean sign vanishes")
                .with_hint("run longer or check the hybridization input"),
        ));
    }

    let mut observables = Measurements::new();
    for name in names {
        let mut total = None;
        let mut contributing = 0usize;
        for sink in sinks {
            if let Some(value) = rank_mean(sink, name) {
                accumulate(&mut total, value);
                contributing += 1;
            }
        }
        let scale = if name == "Sign" { 1.0 } else { sign };
        let norm = contributing as f64 * scale;
        match total {
            Some(Sample::Scalar(value)) => observables.push_scalar(name, value / norm),
            Some(Sample::Vector(values)) => {
                observables.push_vector(name, values.into_iter().map(|v| v / norm).collect())
            }
            None => {}
        }
        debug!(series = name, contributing, "merged");
    }

    Ok(MergedRun {
        ranks: sinks.len(),
        sign,
        observables,
    })
}

/// Loads every measurement file in `paths` and merges them.
pub fn merge_files<P: AsRef<Path>>(paths: &[P]) -> Result<MergedRun, QmcError> {
    let sinks = paths
        .iter()
        .map(|path| Measurements::load(path.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    merge_measurements(&sinks)
}
