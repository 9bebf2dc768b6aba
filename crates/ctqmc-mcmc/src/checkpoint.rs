use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ctqmc_core::errors::ErrorInfo;
use ctqmc_core::{read_json, write_json, QmcError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Integrity constant stamped into every checkpoint.
pub const CHECKPOINT_KEY: i64 = 5_345_433;

/// Persisted chain configuration: one block per site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<S> {
    /// Inverse temperature of the run that wrote the file.
    pub beta: f64,
    /// Number of sites.
    #[serde(rename = "nSite")]
    pub n_site: usize,
    /// Must equal [`CHECKPOINT_KEY`].
    pub key: i64,
    /// Per-site trace snapshots in site order.
    pub sites: Vec<S>,
}

#[derive(Deserialize)]
struct RawCheckpoint {
    beta: f64,
    #[serde(rename = "nSite")]
    n_site: usize,
    key: i64,
    #[serde(default)]
    sites: Vec<serde_json::Value>,
}

/// Why a chain started from an empty configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum FreshReason {
    /// No checkpoint file, or an empty one.
    NoCheckpoint,
    /// The checkpoint could not be used.
    Malformed(ErrorInfo),
}

/// How the chain obtained its initial configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RestoreOutcome {
    /// Started empty.
    Fresh {
        /// Why no configuration was restored.
        reason: FreshReason,
    },
    /// Resumed from a checkpoint.
    Restored {
        /// Total number of operators restored across all sites.
        operators: usize,
    },
}

impl RestoreOutcome {
    /// True when the configuration came from a checkpoint.
    pub fn is_restored(&self) -> bool {
        matches!(self, RestoreOutcome::Restored { .. })
    }
}

/// Result of reading a checkpoint file before the traces see it.
#[derive(Debug, Clone)]
pub enum CheckpointLoad<S> {
    /// Nothing to restore.
    Missing,
    /// Unusable file; the chain starts fresh.
    Malformed(ErrorInfo),
    /// Validated document with decoded site blocks.
    Valid(Checkpoint<S>),
}

/// Per-worker checkpoint location.
pub fn checkpoint_path(root: &Path, rank: u64) -> PathBuf {
    root.join(format!("config_{rank}.json"))
}

fn malformed<S>(code: &str, message: impl Into<String>, path: &Path) -> CheckpointLoad<S> {
    CheckpointLoad::Malformed(
        ErrorInfo::new(code, message).with_context("path", path.display().to_string()),
    )
}

/// Reads and validates the checkpoint at `path` against the current run.
///
/// A `beta` or `n_site` mismatch is an error; every other defect yields
/// [`CheckpointLoad::Malformed`].
pub fn load<S: DeserializeOwned>(
    path: &Path,
    beta: f64,
    n_site: usize,
) -> Result<CheckpointLoad<S>, QmcError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(CheckpointLoad::Missing),
        Err(err) => return Ok(malformed("checkpoint-read", err.to_string(), path)),
    };
    if contents.trim().is_empty() {
        return Ok(CheckpointLoad::Missing);
    }

    let raw: RawCheckpoint = match serde_json::from_str(&contents) {
        Ok(raw) => raw,
        Err(err) => return Ok(malformed("checkpoint-parse", err.to_string(), path)),
    };

    if raw.beta != beta {
        return Err(QmcError::Checkpoint(
            ErrorInfo::new("checkpoint-beta-mismatch", "checkpoint was written at another beta")
                .with_context("path", path.display().to_string())
                .with_context("expected", beta.to_string())
                .with_context("found", raw.beta.to_string())
                .with_hint("remove the checkpoint or restore the original beta"),
        ));
    }
    if raw.n_site != n_site {
        return Err(QmcError::Checkpoint(
            ErrorInfo::new("checkpoint-site-mismatch", "checkpoint holds another number of sites")
                .with_context("path", path.display().to_string())
                .with_context("expected", n_site.to_string())
                .with_context("found", raw.n_site.to_string()),
        ));
    }
    if raw.key != CHECKPOINT_KEY {
        return Ok(malformed(
            "checkpoint-key",
            format!("integrity key {} does not match", raw.key),
            path,
        ));
    }
    if raw.sites.len() != n_site {
        return Ok(malformed(
            "checkpoint-sites",
            format!("expected {n_site} site blocks, found {}", raw.sites.len()),
            path,
        ));
    }

    let mut sites = Vec::with_capacity(n_site);
    for (site, block) in raw.sites.into_iter().enumerate() {
        match serde_json::from_value(block) {
            Ok(snapshot) => sites.push(snapshot),
            Err(err) => {
                return Ok(CheckpointLoad::Malformed(
                    ErrorInfo::new("checkpoint-site-block", err.to_string())
                        .with_context("path", path.display().to_string())
                        .with_context("site", site.to_string()),
                ))
            }
        }
    }

    Ok(CheckpointLoad::Valid(Checkpoint {
        beta: raw.beta,
        n_site: raw.n_site,
        key: raw.key,
        sites,
    }))
}

impl<S: DeserializeOwned> Checkpoint<S> {
    /// Reads a checkpoint without checking it against a run.
    pub fn read(path: &Path) -> Result<Self, QmcError> {
        read_json(path, "checkpoint")
    }
}

impl<S: Serialize> Checkpoint<S> {
    /// Writes the checkpoint as pretty JSON, creating parent directories.
    pub fn store(&self, path: &Path) -> Result<(), QmcError> {
        write_json(path, self, "checkpoint")
    }
}
